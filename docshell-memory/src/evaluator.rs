//! Filter evaluation and value ordering for in-memory documents.
//!
//! Filters follow the shell's matching rules:
//!
//! - a dotted path that crosses an array of documents fans out, and the filter
//!   matches if any reached value matches
//! - a field holding an array matches a scalar operand if any element does
//! - `null` matches both an explicit `null` and a missing field
//! - range operators only compare values of the same kind; `1` and `1.0` are
//!   the same number

use std::cmp::Ordering;

use bson::{Bson, DateTime, Document, oid::ObjectId};

use docshell_core::{
    document::{get_path, lookup_path},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Type-erased, comparable view of a BSON value.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null, or a missing field
    Null,
    /// All integers and floats, normalized to f64
    Number(f64),
    String(&'a str),
    /// Document fields in their stored order
    Map(Vec<(&'a str, Comparable<'a>)>),
    Array(Vec<Comparable<'a>>),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    /// Anything else; only equal to an identical value
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<Vec<_>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's kind in the cross-kind sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    /// Total order used by `$sort`, `$min` and `$max`.
    ///
    /// Values of different kinds order by kind: null, numbers, strings,
    /// documents, arrays, object ids, booleans, dates. NaN sorts below every
    /// other number.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => compare_numbers(*a, *b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Map(a), Comparable::Map(b)) => a
                .iter()
                .zip(b.iter())
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.total_cmp(vb)))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(va, vb)| va.total_cmp(vb))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.cmp(b),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    /// Range comparison; `None` for values of different kinds.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compares two values with the cross-kind sort order.
pub(crate) fn compare_values(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    left.total_cmp(&right)
}

/// Compares two documents by a list of sort keys, in precedence order.
pub(crate) fn compare_documents(a: &Document, b: &Document, sort: &[Sort]) -> Ordering {
    sort.iter()
        .map(|key| {
            let ordering = compare_values(get_path(a, &key.field), get_path(b, &key.field));

            match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Sorts documents in place. The sort is stable, so ties keep their input order.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &[Sort]) {
    if !sort.is_empty() {
        documents.sort_by(|a, b| compare_documents(a, b, sort));
    }
}

/// Evaluates filter expressions against one document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Whether `document` matches `expr`.
    pub fn matches(document: &Document, expr: &Expr) -> bool {
        DocumentEvaluator::new(document)
            .evaluate(expr)
            .unwrap_or(false)
    }

    /// Equality as the shell applies it to a field: direct, element-wise for
    /// arrays, and `null` also matching a missing field.
    fn field_equals(&self, field: &str, value: &Bson) -> bool {
        let candidates = lookup_path(self.document, field);
        let expected = Comparable::from(value);

        if expected == Comparable::Null && candidates.is_empty() {
            return true;
        }

        candidates.into_iter().any(|candidate| {
            let candidate = Comparable::from(candidate);

            match &candidate {
                Comparable::Array(items) => {
                    candidate == expected || items.iter().any(|item| item == &expected)
                }
                _ => candidate == expected,
            }
        })
    }

    fn field_compares(&self, field: &str, value: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let expected = Comparable::from(value);
        let satisfies = |candidate: &Comparable<'_>| {
            candidate
                .partial_cmp(&expected)
                .is_some_and(&accept)
        };

        lookup_path(self.document, field)
            .into_iter()
            .any(|candidate| match Comparable::from(candidate) {
                Comparable::Array(items) => items.iter().any(satisfies),
                scalar => satisfies(&scalar),
            })
    }

    fn field_in(&self, field: &str, values: &Bson) -> bool {
        match values {
            Bson::Array(options) => options.iter().any(|option| self.field_equals(field, option)),
            _ => false,
        }
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(!lookup_path(self.document, field).is_empty() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(match op {
            FieldOp::Eq => self.field_equals(field, value),
            FieldOp::Ne => !self.field_equals(field, value),
            FieldOp::Gt => self.field_compares(field, value, |ordering| ordering == Ordering::Greater),
            FieldOp::Gte => self.field_compares(field, value, |ordering| ordering != Ordering::Less),
            FieldOp::Lt => self.field_compares(field, value, |ordering| ordering == Ordering::Less),
            FieldOp::Lte => self.field_compares(field, value, |ordering| ordering != Ordering::Greater),
            FieldOp::In => self.field_in(field, value),
            FieldOp::Nin => !self.field_in(field, value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(document: &Document, filter: Document) -> bool {
        DocumentEvaluator::matches(document, &Expr::parse(&filter).unwrap())
    }

    #[test]
    fn equality_and_ranges() {
        let book = doc! { "title": "The 5th wave", "publishedYear": 2013, "genre": "Science Fiction" };

        assert!(matches(&book, doc! { "publishedYear": { "$gt": 2000 } }));
        assert!(matches(&book, doc! { "publishedYear": 2013.0 }));
        assert!(!matches(&book, doc! { "publishedYear": { "$gt": "2000" } }));
        assert!(matches(&book, doc! { "genre": { "$in": ["Fiction", "Science Fiction"] } }));
        assert!(matches(&book, doc! { "genre": { "$nin": ["Fiction"] } }));
        assert!(!matches(&book, doc! { "genre": "Fiction" }));
    }

    #[test]
    fn explicit_eq_and_lt() {
        let order = doc! {
            "orderId": 2,
            "status": "Shipped",
            "shipping": { "city": "Nairobi", "days": 3 },
        };

        assert!(matches(&order, doc! { "status": { "$eq": "Shipped" } }));
        assert!(!matches(&order, doc! { "status": { "$eq": "Processing" } }));
        assert!(matches(&order, doc! { "shipping.city": { "$eq": "Nairobi" } }));
        assert!(matches(&order, doc! { "orderId": { "$eq": 2.0 } }));
        assert!(!matches(&order, doc! { "orderId": { "$eq": "2" } }));

        assert!(matches(&order, doc! { "orderId": { "$lt": 3 } }));
        assert!(!matches(&order, doc! { "orderId": { "$lt": 2 } }));
        assert!(matches(&order, doc! { "shipping.days": { "$lt": 5 } }));
        assert!(!matches(&order, doc! { "shipping.days": { "$lt": "5" } }));
        assert!(!matches(&order, doc! { "shipping.missing": { "$lt": 5 } }));
    }

    #[test]
    fn inconsistent_field_names_do_not_match() {
        let hobbit = doc! { "title": "The hobbit", "publisherYear": 1937 };

        assert!(!matches(&hobbit, doc! { "publishedYear": { "$gt": 1900 } }));
        assert!(matches(&hobbit, doc! { "publishedYear": null }));
        assert!(matches(&hobbit, doc! { "publishedYear": { "$exists": false } }));
        assert!(matches(&hobbit, doc! { "publishedYear": { "$ne": 1937 } }));
    }

    #[test]
    fn arrays_fan_out() {
        let order = doc! {
            "orderId": 1,
            "tags": ["gift", "express"],
            "products": [
                { "productId": 1, "quantity": 1 },
                { "productId": 2, "quantity": 2 },
            ],
        };

        assert!(matches(&order, doc! { "products.productId": 2 }));
        assert!(matches(&order, doc! { "products.quantity": { "$gte": 2 } }));
        assert!(!matches(&order, doc! { "products.productId": 3 }));
        assert!(matches(&order, doc! { "tags": "gift" }));
        assert!(matches(&order, doc! { "tags": ["gift", "express"] }));
        assert!(matches(&order, doc! { "products.0.productId": 1 }));
    }

    #[test]
    fn logical_operators() {
        let user = doc! { "userId": 2, "name": "gideon" };

        assert!(matches(&user, doc! { "$or": [{ "userId": 1 }, { "name": "gideon" }] }));
        assert!(!matches(&user, doc! { "$nor": [{ "userId": 2 }] }));
        assert!(matches(&user, doc! { "userId": { "$not": { "$gt": 5 } } }));
        assert!(matches(&user, doc! {}));
    }

    #[test]
    fn cross_kind_sort_order() {
        let number = Bson::Int32(5);
        let text = Bson::String("5".to_string());
        let flag = Bson::Boolean(false);

        assert_eq!(compare_values(None, Some(&number)), Ordering::Less);
        assert_eq!(compare_values(Some(&number), Some(&text)), Ordering::Less);
        assert_eq!(compare_values(Some(&text), Some(&flag)), Ordering::Less);
        assert_eq!(compare_values(Some(&Bson::Null), None), Ordering::Equal);
        assert_eq!(
            compare_values(Some(&Bson::Double(4.5)), Some(&Bson::Int64(5))),
            Ordering::Less
        );
    }

    #[test]
    fn nan_sorts_below_other_numbers() {
        let mut readings = (0..64i32)
            .map(|i| {
                let value = if i % 3 == 0 { f64::NAN } else { f64::from(i) };
                doc! { "i": i, "r": value }
            })
            .collect::<Vec<_>>();
        readings.push(doc! { "i": 64 });

        let sort = Sort::parse_spec(&doc! { "r": 1 }).unwrap();
        sort_documents(&mut readings, &sort);

        assert_eq!(readings[0].get_i32("i").unwrap(), 64);
        assert!(readings[1..23].iter().all(|reading| reading.get_f64("r").unwrap().is_nan()));
        assert_eq!(readings[23].get_f64("r").unwrap(), 1.0);
        assert_eq!(readings[64].get_f64("r").unwrap(), 62.0);

        let nan = Bson::Double(f64::NAN);
        assert_eq!(compare_values(Some(&nan), Some(&nan)), Ordering::Equal);
        assert_eq!(compare_values(Some(&nan), Some(&Bson::Int32(i32::MIN))), Ordering::Less);
    }

    #[test]
    fn stable_multi_key_sort() {
        let mut books = vec![
            doc! { "title": "a", "rating": 4.5, "year": 2012 },
            doc! { "title": "b", "rating": 5 },
            doc! { "title": "c", "rating": 4.5, "year": 1937 },
            doc! { "title": "d", "rating": 4.5, "year": 2012 },
        ];
        let sort = Sort::parse_spec(&doc! { "rating": -1, "year": 1 }).unwrap();

        sort_documents(&mut books, &sort);

        let titles = books
            .iter()
            .map(|book| book.get_str("title").unwrap())
            .collect::<Vec<_>>();
        assert_eq!(titles, ["b", "c", "a", "d"]);
    }
}

//! Filter expressions and query construction.
//!
//! Filters arrive as shell-style documents (`{ author: "Henrik Ibsen" }`,
//! `{ publishedYear: { $gt: 2000 } }`) and are parsed into an [`Expr`] tree.
//! Backends evaluate that tree through the [`QueryVisitor`] trait.
//!
//! # Filter Expression API
//!
//! Expressions can also be built directly with the [`Filter`] helpers:
//!
//! ```ignore
//! use docshell::query::{Query, Filter, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("genre", "Fiction").and(Filter::gt("publishedYear", 2000)))
//!     .sort("title", SortDirection::Asc)
//!     .limit(10)
//!     .build();
//! ```

use std::fmt;

use bson::{Bson, Document, doc};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Sort direction for query results and index markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (`1`).
    Asc,
    /// Descending order (`-1`).
    Desc,
}

impl SortDirection {
    /// Parses the shell's `1` / `-1` notation.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        let number = match value {
            Bson::Int32(v) => *v as f64,
            Bson::Int64(v) => *v as f64,
            Bson::Double(v) => *v,
            _ => return None,
        };

        if number == 1.0 {
            Some(SortDirection::Asc)
        } else if number == -1.0 {
            Some(SortDirection::Desc)
        } else {
            None
        }
    }

    /// The shell notation for this direction.
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The (possibly dotted) field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Parses a sort specification such as `{ rating: -1, title: 1 }`.
    ///
    /// Keys keep their document order, which is also their precedence.
    pub fn parse_spec(spec: &Document) -> DocumentStoreResult<Vec<Sort>> {
        if spec.is_empty() {
            return Err(DocumentStoreError::InvalidPipeline(
                "sort specification must name at least one field".to_string(),
            ));
        }

        spec.iter()
            .map(|(field, value)| match SortDirection::from_bson(value) {
                Some(direction) => Ok(Sort { field: field.clone(), direction }),
                None => Err(DocumentStoreError::InvalidPipeline(format!(
                    "sort direction for '{field}' must be 1 or -1, got {value}"
                ))),
            })
            .collect()
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// `$eq`
    Eq,
    /// `$ne`
    Ne,
    /// `$gt`
    Gt,
    /// `$gte`
    Gte,
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
    /// `$in`: the field matches any value of the operand array.
    In,
    /// `$nin`: the field matches none of the values of the operand array.
    Nin,
}

impl FieldOp {
    /// The shell operator name.
    pub fn operator(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::In => "$in",
            FieldOp::Nin => "$nin",
        }
    }

    fn from_operator(name: &str) -> Option<Self> {
        Some(match name {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::In,
            "$nin" => FieldOp::Nin,
            _ => return None,
        })
    }
}

/// A filter expression for querying documents.
///
/// An empty `And` matches every document, which is what an empty filter
/// document (`{}`) parses to.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The dotted field path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Returns `true` for the expression that matches every document.
    pub fn matches_all(&self) -> bool {
        matches!(self, Expr::And(list) if list.is_empty())
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Parses a shell filter document.
    ///
    /// - `{ field: value }` is implicit equality, top-level entries are ANDed
    /// - `{ field: { $op: value, ... } }` uses operator sub-documents
    /// - `$and`, `$or` and `$nor` take arrays of filter documents
    /// - `$not` negates an operator sub-document
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidFilter`] for unknown operators or
    /// malformed operands.
    pub fn parse(filter: &Document) -> DocumentStoreResult<Expr> {
        let mut children = Vec::with_capacity(filter.len());

        for (key, value) in filter {
            match key.as_str() {
                "$and" => children.push(Expr::And(parse_filter_array(key, value)?)),
                "$or" => children.push(Expr::Or(parse_filter_array(key, value)?)),
                "$nor" => children.push(Expr::Or(parse_filter_array(key, value)?).not()),
                other if other.starts_with('$') => {
                    return Err(DocumentStoreError::InvalidFilter(format!(
                        "unknown top-level operator: {other}"
                    )));
                }
                field => children.push(parse_field_condition(field, value)?),
            }
        }

        Ok(collapse(children))
    }
}

fn collapse(mut children: Vec<Expr>) -> Expr {
    if children.len() == 1 {
        children.remove(0)
    } else {
        Expr::And(children)
    }
}

fn parse_filter_array(operator: &str, value: &Bson) -> DocumentStoreResult<Vec<Expr>> {
    let items = match value {
        Bson::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(DocumentStoreError::InvalidFilter(format!(
                "{operator} expects a non-empty array of filter documents"
            )));
        }
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(filter) => Expr::parse(filter),
            other => Err(DocumentStoreError::InvalidFilter(format!(
                "{operator} array elements must be documents, got {other}"
            ))),
        })
        .collect()
}

fn is_operator_document(value: &Bson) -> Option<&Document> {
    match value {
        Bson::Document(inner) if inner.keys().next().is_some_and(|key| key.starts_with('$')) => {
            Some(inner)
        }
        _ => None,
    }
}

fn parse_field_condition(field: &str, value: &Bson) -> DocumentStoreResult<Expr> {
    match is_operator_document(value) {
        Some(operators) => parse_operator_document(field, operators),
        None => Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone())),
    }
}

fn parse_operator_document(field: &str, operators: &Document) -> DocumentStoreResult<Expr> {
    let mut conditions = Vec::with_capacity(operators.len());

    for (name, operand) in operators {
        let condition = match name.as_str() {
            "$exists" => Expr::Exists(field.to_string(), truthy(operand)),
            "$not" => match is_operator_document(operand) {
                Some(inner) => parse_operator_document(field, inner)?.not(),
                None => {
                    return Err(DocumentStoreError::InvalidFilter(format!(
                        "$not on '{field}' expects an operator document"
                    )));
                }
            },
            other => match FieldOp::from_operator(other) {
                Some(op @ (FieldOp::In | FieldOp::Nin)) => {
                    if !matches!(operand, Bson::Array(_)) {
                        return Err(DocumentStoreError::InvalidFilter(format!(
                            "{other} on '{field}' expects an array"
                        )));
                    }
                    Expr::field(field.to_string(), op, operand.clone())
                }
                Some(op) => Expr::field(field.to_string(), op, operand.clone()),
                None => {
                    return Err(DocumentStoreError::InvalidFilter(format!(
                        "unknown operator {other} on '{field}'"
                    )));
                }
            },
        };

        conditions.push(condition);
    }

    Ok(collapse(conditions))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(v) => *v != 0,
        Bson::Int64(v) => *v != 0,
        Bson::Double(v) => *v != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// A structured query for retrieving documents.
///
/// Use [`QueryBuilder`] for ergonomic construction.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter expression; `None` matches every document.
    pub filter: Option<Expr>,
    /// Sort keys in precedence order; empty keeps insertion order.
    pub sort: Vec<Sort>,
    /// Number of documents to skip.
    pub skip: Option<usize>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl Query {
    /// Creates a new empty query that matches every document.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a query from a parsed filter.
    pub fn filtered(filter: Expr) -> Self {
        Query { filter: Some(filter), ..Query::default() }
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>`.
pub struct Filter;

impl Filter {
    /// Matches every document.
    pub fn all() -> Expr {
        Expr::And(Vec::new())
    }

    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field equals any of the values.
    pub fn is_in(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::In,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field equals none of the values.
    pub fn not_in(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::Nin,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// All expressions must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Any expression must match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// No expression may match.
    pub fn nor(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect()).not()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter expression for this query.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Appends a sort key; earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = Some(skip);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// Renders an expression back into shell filter syntax, for logs and `Display`.
struct FilterRenderer;

impl QueryVisitor for FilterRenderer {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(Document::new());
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$not": self.visit_expr(expr)? })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! { field: { "$exists": should_exist } })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let operator = op.operator();
        Ok(doc! { field: { operator: value.clone() } })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match FilterRenderer.visit_expr(self) {
            Ok(rendered) => write!(f, "{rendered}"),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_all() {
        let expr = Expr::parse(&doc! {}).unwrap();
        assert!(expr.matches_all());
    }

    #[test]
    fn implicit_equality_and_operators() {
        let expr = Expr::parse(&doc! {
            "author": "Henrik Ibsen",
            "publishedYear": { "$gt": 1800, "$lte": 2000 },
        })
        .unwrap();

        assert_eq!(
            expr,
            Expr::And(vec![
                Filter::eq("author", "Henrik Ibsen"),
                Expr::And(vec![
                    Filter::gt("publishedYear", 1800),
                    Filter::lte("publishedYear", 2000),
                ]),
            ])
        );
    }

    #[test]
    fn embedded_document_without_operators_is_equality() {
        let expr = Expr::parse(&doc! { "dimensions": { "w": 1, "h": 2 } }).unwrap();
        assert_eq!(expr, Filter::eq("dimensions", doc! { "w": 1, "h": 2 }));
    }

    #[test]
    fn logical_operators() {
        let expr = Expr::parse(&doc! {
            "$or": [ { "genre": "Fiction" }, { "genre": "Fantasy" } ],
            "$nor": [ { "title": { "$exists": true } } ],
        })
        .unwrap();

        assert_eq!(
            expr,
            Expr::And(vec![
                Filter::or([Filter::eq("genre", "Fiction"), Filter::eq("genre", "Fantasy")]),
                Filter::nor([Filter::exists("title")]),
            ])
        );
    }

    #[test]
    fn not_wraps_operator_document() {
        let expr = Expr::parse(&doc! { "price": { "$not": { "$gt": 500 } } }).unwrap();
        assert_eq!(expr, Filter::gt("price", 500).not());
    }

    #[test]
    fn rejects_malformed_filters() {
        for filter in [
            doc! { "$where": "this.a > 1" },
            doc! { "price": { "$between": [1, 2] } },
            doc! { "price": { "$in": 5 } },
            doc! { "$or": [] },
            doc! { "$and": [ 1 ] },
            doc! { "price": { "$not": 5 } },
        ] {
            assert!(
                matches!(Expr::parse(&filter), Err(DocumentStoreError::InvalidFilter(_))),
                "expected InvalidFilter for {filter}"
            );
        }
    }

    #[test]
    fn sort_spec_keeps_key_order() {
        let sort = Sort::parse_spec(&doc! { "rating": -1, "title": 1 }).unwrap();
        assert_eq!(
            sort,
            vec![
                Sort { field: "rating".into(), direction: SortDirection::Desc },
                Sort { field: "title".into(), direction: SortDirection::Asc },
            ]
        );
        assert!(Sort::parse_spec(&doc! { "rating": 0 }).is_err());
    }

    #[test]
    fn display_renders_shell_syntax() {
        let expr = Filter::gt("publishedYear", 2000);
        assert_eq!(expr.to_string(), doc! { "publishedYear": { "$gt": 2000 } }.to_string());
    }
}

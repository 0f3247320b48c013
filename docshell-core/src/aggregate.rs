//! Aggregation pipeline model.
//!
//! A pipeline is an ordered list of [`Stage`]s. Each stage is a pure
//! transformation from one document sequence to the next; backends apply them
//! in order. This module only parses and describes pipelines, the execution
//! lives with the backend that owns the documents.
//!
//! ```ignore
//! use docshell::aggregate::Pipeline;
//! use bson::doc;
//!
//! let pipeline = Pipeline::parse(&[
//!     doc! { "$group": { "_id": "$genre", "totalBooks": { "$sum": 1 } } },
//!     doc! { "$sort": { "totalBooks": -1 } },
//!     doc! { "$limit": 3 },
//! ])?;
//! ```

use bson::{Bson, Document};

use crate::{
    document::{get_path, lookup_path},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Sort},
};

/// A value expression used by `$group` keys and accumulator operands.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    /// A constant (`1`, `null`, `"x"`).
    Literal(Bson),
    /// A field reference written as `"$path"`.
    Path(String),
    /// A document whose fields are themselves expressions.
    Object(Vec<(String, ValueExpr)>),
}

impl ValueExpr {
    /// Parses an expression operand.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidPipeline`] for expression operators
    /// (`{ $add: ... }`), which this store does not evaluate.
    pub fn parse(value: &Bson) -> DocumentStoreResult<Self> {
        match value {
            Bson::String(text) if text.starts_with('$') && text.len() > 1 => {
                Ok(ValueExpr::Path(text[1..].to_string()))
            }
            Bson::Document(fields) => {
                if let Some(operator) = fields.keys().find(|key| key.starts_with('$')) {
                    return Err(DocumentStoreError::InvalidPipeline(format!(
                        "expression operator {operator} is not supported"
                    )));
                }

                fields
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), ValueExpr::parse(value)?)))
                    .collect::<DocumentStoreResult<Vec<_>>>()
                    .map(ValueExpr::Object)
            }
            other => Ok(ValueExpr::Literal(other.clone())),
        }
    }

    /// Evaluates the expression against a document.
    ///
    /// Returns `None` when a referenced field is missing. A path that crosses
    /// an array of documents evaluates to the array of reached values.
    pub fn evaluate(&self, document: &Document) -> Option<Bson> {
        match self {
            ValueExpr::Literal(value) => Some(value.clone()),
            ValueExpr::Path(path) => match get_path(document, path) {
                Some(value) => Some(value.clone()),
                None => {
                    let values = lookup_path(document, path);
                    if values.is_empty() {
                        None
                    } else {
                        Some(Bson::Array(values.into_iter().cloned().collect()))
                    }
                }
            },
            ValueExpr::Object(fields) => {
                let mut out = Document::new();
                for (name, expr) in fields {
                    if let Some(value) = expr.evaluate(document) {
                        out.insert(name.clone(), value);
                    }
                }
                Some(Bson::Document(out))
            }
        }
    }
}

/// Accumulator operators available inside `$group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorOp {
    /// `$sum`
    Sum,
    /// `$avg`
    Avg,
    /// `$min`
    Min,
    /// `$max`
    Max,
    /// `$first`
    First,
    /// `$last`
    Last,
}

impl AccumulatorOp {
    fn from_operator(name: &str) -> Option<Self> {
        Some(match name {
            "$sum" => AccumulatorOp::Sum,
            "$avg" => AccumulatorOp::Avg,
            "$min" => AccumulatorOp::Min,
            "$max" => AccumulatorOp::Max,
            "$first" => AccumulatorOp::First,
            "$last" => AccumulatorOp::Last,
            _ => return None,
        })
    }
}

/// One named output field of a `$group` stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    /// Output field name.
    pub name: String,
    /// The accumulator operator.
    pub op: AccumulatorOp,
    /// The per-document input.
    pub operand: ValueExpr,
}

/// A `$group` stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStage {
    /// The grouping key, emitted as the `_id` of each output document.
    pub key: ValueExpr,
    /// Output fields in declaration order.
    pub accumulators: Vec<Accumulator>,
}

impl GroupStage {
    fn parse(body: &Bson) -> DocumentStoreResult<Self> {
        let Bson::Document(spec) = body else {
            return Err(DocumentStoreError::InvalidPipeline("$group expects a document".to_string()));
        };

        let key = match spec.get("_id") {
            Some(key) => ValueExpr::parse(key)?,
            None => {
                return Err(DocumentStoreError::InvalidPipeline(
                    "$group requires an _id key expression".to_string(),
                ));
            }
        };

        let mut accumulators = Vec::new();

        for (name, value) in spec.iter().filter(|(name, _)| name.as_str() != "_id") {
            let (operator, operand) = match value {
                Bson::Document(acc) if acc.len() == 1 => acc
                    .iter()
                    .next()
                    .map(|(operator, operand)| (operator.as_str(), operand))
                    .ok_or_else(|| {
                        DocumentStoreError::InvalidPipeline(format!("$group field '{name}' is empty"))
                    })?,
                _ => {
                    return Err(DocumentStoreError::InvalidPipeline(format!(
                        "$group field '{name}' must be a single accumulator such as {{ $sum: 1 }}"
                    )));
                }
            };

            let op = AccumulatorOp::from_operator(operator).ok_or_else(|| {
                DocumentStoreError::InvalidPipeline(format!("unknown accumulator {operator} for '{name}'"))
            })?;

            accumulators.push(Accumulator {
                name: name.clone(),
                op,
                operand: ValueExpr::parse(operand)?,
            });
        }

        Ok(Self { key, accumulators })
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// `$match`: keep documents matching the filter.
    Match(Expr),
    /// `$group`: fold documents into one output document per key.
    Group(GroupStage),
    /// `$sort`: stable multi-key sort.
    Sort(Vec<Sort>),
    /// `$skip`: drop the first n documents.
    Skip(usize),
    /// `$limit`: keep at most n documents.
    Limit(usize),
}

impl Stage {
    /// Parses a single stage document such as `{ $limit: 1 }`.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::UnsupportedStage`] for unknown stage names
    /// - [`DocumentStoreError::InvalidPipeline`] for malformed stage bodies
    pub fn parse(stage: &Document) -> DocumentStoreResult<Self> {
        let mut entries = stage.iter();
        let (name, body) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(DocumentStoreError::InvalidPipeline(format!(
                    "a pipeline stage must have exactly one field, got {stage}"
                )));
            }
        };

        match name.as_str() {
            "$match" => match body {
                Bson::Document(filter) => Expr::parse(filter)
                    .map(Stage::Match)
                    .map_err(|err| DocumentStoreError::InvalidPipeline(format!("$match: {err}"))),
                _ => Err(DocumentStoreError::InvalidPipeline("$match expects a document".to_string())),
            },
            "$group" => GroupStage::parse(body).map(Stage::Group),
            "$sort" => match body {
                Bson::Document(spec) => Sort::parse_spec(spec).map(Stage::Sort),
                _ => Err(DocumentStoreError::InvalidPipeline("$sort expects a document".to_string())),
            },
            "$skip" => count_operand("$skip", body, 0).map(Stage::Skip),
            "$limit" => count_operand("$limit", body, 1).map(Stage::Limit),
            other => Err(DocumentStoreError::UnsupportedStage(other.to_string())),
        }
    }
}

fn count_operand(stage: &str, body: &Bson, minimum: i64) -> DocumentStoreResult<usize> {
    let value = match body {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    };

    match value {
        Some(count) if count >= minimum => usize::try_from(count).map_err(|_| {
            DocumentStoreError::InvalidPipeline(format!("{stage} value {count} is out of range"))
        }),
        _ => Err(DocumentStoreError::InvalidPipeline(format!(
            "{stage} expects an integer >= {minimum}, got {body}"
        ))),
    }
}

/// An ordered list of stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Creates an empty pipeline, which passes documents through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a shell pipeline (`[{ $group: ... }, { $sort: ... }]`).
    pub fn parse(stages: &[Document]) -> DocumentStoreResult<Self> {
        stages
            .iter()
            .map(Stage::parse)
            .collect::<DocumentStoreResult<Vec<_>>>()
            .map(|stages| Self { stages })
    }

    /// Appends a stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// The stages in application order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, SortDirection};
    use bson::doc;

    #[test]
    fn parses_original_session_pipelines() {
        let per_genre = Pipeline::parse(&[
            doc! { "$group": { "_id": "$genre", "totalBooks": { "$sum": 1 } } },
        ])
        .unwrap();
        assert_eq!(
            per_genre.stages(),
            &[Stage::Group(GroupStage {
                key: ValueExpr::Path("genre".into()),
                accumulators: vec![Accumulator {
                    name: "totalBooks".into(),
                    op: AccumulatorOp::Sum,
                    operand: ValueExpr::Literal(Bson::Int32(1)),
                }],
            })]
        );

        let top_rated = Pipeline::parse(&[doc! { "$sort": { "rating": -1 } }, doc! { "$limit": 1 }]).unwrap();
        assert_eq!(
            top_rated.stages(),
            &[
                Stage::Sort(vec![Sort { field: "rating".into(), direction: SortDirection::Desc }]),
                Stage::Limit(1),
            ]
        );
    }

    #[test]
    fn match_stage_reuses_filter_parser() {
        let stage = Stage::parse(&doc! { "$match": { "category": "Electronics" } }).unwrap();
        assert_eq!(stage, Stage::Match(Filter::eq("category", "Electronics")));
    }

    #[test]
    fn unknown_stage_is_unsupported() {
        let err = Pipeline::parse(&[doc! { "$limit": 1 }, doc! { "$lookup": { "from": "users" } }]).unwrap_err();
        assert_eq!(err, DocumentStoreError::UnsupportedStage("$lookup".into()));
    }

    #[test]
    fn malformed_stages_are_invalid() {
        for stage in [
            doc! { "$limit": 0 },
            doc! { "$skip": -1 },
            doc! { "$limit": "1" },
            doc! { "$group": { "total": { "$sum": 1 } } },
            doc! { "$group": { "_id": null, "total": { "$median": "$x" } } },
            doc! { "$group": { "_id": null, "total": 1 } },
            doc! { "$group": { "_id": { "$toUpper": "$genre" } } },
            doc! { "$sort": { "rating": 2 } },
            doc! { "$limit": 1, "$skip": 1 },
        ] {
            assert!(
                matches!(Stage::parse(&stage), Err(DocumentStoreError::InvalidPipeline(_))),
                "expected InvalidPipeline for {stage}"
            );
        }
    }

    #[test]
    fn value_expressions_resolve_paths() {
        let order = doc! {
            "userId": 1,
            "shipping": { "city": "Nairobi" },
            "products": [ { "productId": 1 }, { "productId": 2 } ],
        };

        let key = ValueExpr::parse(&Bson::Document(doc! { "user": "$userId", "city": "$shipping.city" })).unwrap();
        assert_eq!(key.evaluate(&order), Some(Bson::Document(doc! { "user": 1, "city": "Nairobi" })));
        assert_eq!(
            ValueExpr::Path("products.productId".into()).evaluate(&order),
            Some(Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]))
        );
        assert_eq!(ValueExpr::Path("missing".into()).evaluate(&order), None);
    }
}

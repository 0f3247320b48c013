//! Update specifications (`{ $set: { rating: 4.5 } }`).
//!
//! An [`UpdateSpec`] is parsed and validated once, then applied to every matched
//! document. Only operator-style updates are accepted; the store never replaces
//! whole documents through the update path.

use bson::{Bson, Document};

use crate::{
    document::{ID_FIELD, get_path, remove_path, set_path},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// A single field modification.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// `$set`: replace or create the field.
    Set(String, Bson),
    /// `$unset`: remove the field.
    Unset(String),
    /// `$inc`: add a number to the field (a missing field counts as zero).
    Inc(String, Bson),
}

impl UpdateOp {
    fn path(&self) -> &str {
        match self {
            UpdateOp::Set(path, _) | UpdateOp::Unset(path) | UpdateOp::Inc(path, _) => path,
        }
    }
}

/// A validated, ordered list of field modifications.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    ops: Vec<UpdateOp>,
}

impl UpdateSpec {
    /// Builds a `$set` update from field/value pairs.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::InvalidUpdate`] when `fields` is empty or
    /// touches `_id`.
    pub fn set(fields: Document) -> DocumentStoreResult<Self> {
        Self::parse(&bson::doc! { "$set": fields })
    }

    /// Parses a shell update document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidUpdate`] if the spec is empty, is a
    /// replacement document, names an unknown operator, has an empty or
    /// non-document operand, or touches `_id`.
    pub fn parse(spec: &Document) -> DocumentStoreResult<Self> {
        if spec.is_empty() {
            return Err(DocumentStoreError::InvalidUpdate("update specification is empty".to_string()));
        }

        let mut ops = Vec::new();

        for (operator, operand) in spec {
            let fields = match operand {
                Bson::Document(fields) if !fields.is_empty() => fields,
                Bson::Document(_) => {
                    return Err(DocumentStoreError::InvalidUpdate(format!(
                        "{operator} requires at least one field"
                    )));
                }
                _ if !operator.starts_with('$') => {
                    return Err(DocumentStoreError::InvalidUpdate(format!(
                        "update must use operators such as $set, found plain field '{operator}'"
                    )));
                }
                other => {
                    return Err(DocumentStoreError::InvalidUpdate(format!(
                        "{operator} expects a document, got {other}"
                    )));
                }
            };

            for (path, value) in fields {
                let op = match operator.as_str() {
                    "$set" => UpdateOp::Set(path.clone(), value.clone()),
                    "$unset" => UpdateOp::Unset(path.clone()),
                    "$inc" => match value {
                        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
                            UpdateOp::Inc(path.clone(), value.clone())
                        }
                        other => {
                            return Err(DocumentStoreError::InvalidUpdate(format!(
                                "$inc on '{path}' expects a number, got {other}"
                            )));
                        }
                    },
                    other if other.starts_with('$') => {
                        return Err(DocumentStoreError::InvalidUpdate(format!(
                            "unsupported update operator {other}"
                        )));
                    }
                    other => {
                        return Err(DocumentStoreError::InvalidUpdate(format!(
                            "update must use operators such as $set, found plain field '{other}'"
                        )));
                    }
                };

                if op.path() == ID_FIELD || op.path().starts_with("_id.") {
                    return Err(DocumentStoreError::InvalidUpdate(
                        "the _id field is immutable".to_string(),
                    ));
                }

                ops.push(op);
            }
        }

        Ok(Self { ops })
    }

    /// The modifications in application order.
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Applies the modifications to `document` in place.
    ///
    /// Returns `true` if the document changed. On error the document may be
    /// partially modified; callers apply to a copy when they need all-or-nothing.
    pub fn apply(&self, document: &mut Document) -> DocumentStoreResult<bool> {
        let before = document.clone();

        for op in &self.ops {
            match op {
                UpdateOp::Set(path, value) => set_path(document, path, value.clone())?,
                UpdateOp::Unset(path) => {
                    remove_path(document, path);
                }
                UpdateOp::Inc(path, amount) => {
                    let current = get_path(document, path).cloned();
                    let next = match current {
                        None => amount.clone(),
                        Some(value) => add_numbers(&value, amount).ok_or_else(|| {
                            DocumentStoreError::InvalidUpdate(format!(
                                "cannot apply $inc to non-numeric field '{path}' ({value})"
                            ))
                        })?,
                    };
                    set_path(document, path, next)?;
                }
            }
        }

        Ok(*document != before)
    }
}

fn add_numbers(left: &Bson, right: &Bson) -> Option<Bson> {
    Some(match (left, right) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64((*a as i64).checked_add(*b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(*b as i64)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b)?),
        (Bson::Double(a), other) => Bson::Double(a + as_f64(other)?),
        (other, Bson::Double(b)) => Bson::Double(as_f64(other)? + b),
        _ => return None,
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

//! Schema-less document helpers.
//!
//! Documents are plain [`bson::Document`] values: an ordered mapping from field
//! name to [`Bson`]. Nothing here enforces a schema, so two documents in the same
//! collection may carry unrelated field sets. The helpers in this module resolve
//! dotted field paths, manage the `_id` field and convert between typed Rust
//! values and documents.

use bson::{
    Bson,
    de::deserialize_from_document,
    ser::serialize_to_document,
};
use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

pub use bson::Document;

/// Name of the identifier field every stored document carries.
pub const ID_FIELD: &str = "_id";

/// Returns the `_id` of a document, if present.
pub fn document_id(document: &Document) -> Option<&Bson> {
    document.get(ID_FIELD)
}

/// Renders an `_id` value for error messages and logs.
///
/// Strings are shown without quotes and object ids as their hex form, so the
/// output reads the way the id was written in the original command.
pub fn render_id(id: &Bson) -> String {
    match id {
        Bson::String(value) => value.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

/// Returns a copy of `document` whose first field is `_id = id`.
///
/// Any existing `_id` is replaced; the relative order of the other fields is kept.
pub fn with_leading_id(document: Document, id: Bson) -> Document {
    let mut out = Document::new();
    out.insert(ID_FIELD, id);

    for (key, value) in document {
        if key != ID_FIELD {
            out.insert(key, value);
        }
    }

    out
}

/// Resolves a dotted path without descending into arrays.
///
/// Numeric segments index into arrays (`items.0.name`).
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Resolves a dotted path and returns every value it reaches.
///
/// Arrays of documents fan out: `products.productId` yields the `productId` of
/// every element of `products`. An empty result means the path is missing.
pub fn lookup_path<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();

    if let Some((first, rest)) = segments.split_first() {
        if let Some(value) = document.get(*first) {
            collect_path(value, rest, &mut found);
        }
    }

    found
}

fn collect_path<'a>(value: &'a Bson, rest: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((segment, tail)) = rest.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(inner) => {
            if let Some(next) = inner.get(*segment) {
                collect_path(next, tail, found);
            }
        }
        Bson::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    collect_path(next, tail, found);
                }
            }

            for item in items {
                if let Bson::Document(inner) = item {
                    if let Some(next) = inner.get(*segment) {
                        collect_path(next, tail, found);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Writes `value` at a dotted path, creating intermediate documents as needed.
///
/// Numeric segments index into arrays the same way [`get_path`] reads them;
/// writing past the end pads the array with `null`.
///
/// Fails with [`DocumentStoreError::InvalidUpdate`] when an intermediate segment
/// holds a scalar, or names a non-numeric field inside an array.
pub fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, tail)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(child) => set_in_value(child, head, tail, value),
                None => Err(DocumentStoreError::InvalidUpdate(format!("cannot create field '{head}'"))),
            }
        }
    }
}

fn set_in_value(parent: &mut Bson, parent_name: &str, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match parent {
        Bson::Document(inner) => set_path(inner, path, value),
        Bson::Array(items) => {
            let (segment, tail) = match path.split_once('.') {
                Some((segment, tail)) => (segment, Some(tail)),
                None => (path, None),
            };
            let index = segment.parse::<usize>().map_err(|_| {
                DocumentStoreError::InvalidUpdate(format!(
                    "cannot create field '{segment}' inside array field '{parent_name}'"
                ))
            })?;

            if index >= items.len() {
                items.resize(index + 1, Bson::Null);

                if tail.is_some() {
                    items[index] = Bson::Document(Document::new());
                }
            }

            match tail {
                None => {
                    items[index] = value;
                    Ok(())
                }
                Some(tail) => set_in_value(&mut items[index], segment, tail, value),
            }
        }
        _ => Err(DocumentStoreError::InvalidUpdate(format!(
            "cannot create field '{path}' inside non-document field '{parent_name}'"
        ))),
    }
}

/// Removes the value at a dotted path, returning it if it existed.
///
/// An array element addressed by index is replaced with `null` rather than
/// removed, so the positions of the other elements do not shift.
pub fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, tail)) => remove_in_value(document.get_mut(head)?, tail),
    }
}

fn remove_in_value(parent: &mut Bson, path: &str) -> Option<Bson> {
    match parent {
        Bson::Document(inner) => remove_path(inner, path),
        Bson::Array(items) => {
            let (segment, tail) = match path.split_once('.') {
                Some((segment, tail)) => (segment, Some(tail)),
                None => (path, None),
            };
            let item = items.get_mut(segment.parse::<usize>().ok()?)?;

            match tail {
                None => Some(std::mem::replace(item, Bson::Null)),
                Some(tail) => remove_in_value(item, tail),
            }
        }
        _ => None,
    }
}

/// Serializes a typed value into a document.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`] if the value does not serialize
/// to a BSON document.
pub fn to_document<T: Serialize>(value: &T) -> DocumentStoreResult<Document> {
    Ok(serialize_to_document(value)?)
}

/// Deserializes a document into a typed value.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`] if the document does not match `T`.
pub fn from_document<T: for<'de> Deserialize<'de>>(document: Document) -> DocumentStoreResult<T> {
    Ok(deserialize_from_document(document)?)
}

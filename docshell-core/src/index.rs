//! Index markers.
//!
//! An index marker records that a field was declared indexed. It is kept for
//! information only: it never changes which documents a query returns or the
//! order they come back in.

use bson::Document;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::SortDirection,
};

/// A declared single-field index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexModel {
    /// Generated name, `<field>_<direction>` (e.g. `author_1`).
    pub name: String,
    /// Indexed field path.
    pub field: String,
    /// Declared key direction.
    pub direction: SortDirection,
}

impl IndexModel {
    /// Creates a marker with the conventional generated name.
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        let field = field.into();

        Self {
            name: format!("{field}_{}", direction.as_i32()),
            field,
            direction,
        }
    }

    /// Parses a key document such as `{ author: 1 }`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCommand`] unless the document names
    /// exactly one field with direction `1` or `-1`.
    pub fn from_keys(keys: &Document) -> DocumentStoreResult<Self> {
        let mut entries = keys.iter();

        match (entries.next(), entries.next()) {
            (Some((field, value)), None) => SortDirection::from_bson(value)
                .map(|direction| IndexModel::new(field.clone(), direction))
                .ok_or_else(|| {
                    DocumentStoreError::InvalidCommand(format!(
                        "index direction for '{field}' must be 1 or -1, got {value}"
                    ))
                }),
            _ => Err(DocumentStoreError::InvalidCommand(format!(
                "index keys must name exactly one field, got {keys}"
            ))),
        }
    }

    /// The key document in shell notation.
    pub fn keys(&self) -> Document {
        let mut keys = Document::new();
        keys.insert(self.field.clone(), self.direction.as_i32());
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn names_follow_field_and_direction() {
        let index = IndexModel::from_keys(&doc! { "author": 1 }).unwrap();
        assert_eq!(index.name, "author_1");
        assert_eq!(index.keys(), doc! { "author": 1 });

        assert_eq!(IndexModel::new("price", SortDirection::Desc).name, "price_-1");
    }

    #[test]
    fn compound_keys_are_rejected() {
        assert!(IndexModel::from_keys(&doc! { "author": 1, "title": 1 }).is_err());
        assert!(IndexModel::from_keys(&doc! {}).is_err());
        assert!(IndexModel::from_keys(&doc! { "author": "text" }).is_err());
    }
}

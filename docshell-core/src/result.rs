//! Acknowledgements returned by mutating operations.

use bson::Bson;
use serde::Serialize;

/// Outcome of `insert_one`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// The `_id` of the inserted document, generated or supplied.
    pub inserted_id: Bson,
}

/// Outcome of `insert_many`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertManyResult {
    /// The `_id`s of the inserted documents, in batch order.
    pub inserted_ids: Vec<Bson>,
}

/// Outcome of `update_one` / `update_many`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    /// Documents selected by the filter.
    pub matched_count: u64,
    /// Documents whose content actually changed.
    pub modified_count: u64,
}

/// Outcome of `delete_one` / `delete_many`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Documents removed.
    pub deleted_count: u64,
}

/// Whether a filtered write touches the first match or every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    /// Only the first match in insertion order.
    One,
    /// Every match.
    Many,
}

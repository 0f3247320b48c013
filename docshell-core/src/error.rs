//! Error types and result types for document store operations.
//!
//! Every fallible operation in the workspace returns a [`DocumentStoreResult<T>`].
//! Errors are raised at the offending operation and never roll back earlier,
//! successfully completed operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentStoreError {
    /// A collection with the given name already exists.
    #[error("Collection already exists: {0}")]
    AlreadyExists(String),
    /// A document with the given `_id` already exists in the collection.
    #[error("Duplicate key {id} in collection {collection}")]
    DuplicateKey {
        /// Rendered `_id` value of the rejected document.
        id: String,
        /// Name of the target collection.
        collection: String,
    },
    /// The update specification is empty or malformed.
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
    /// The operation targets a collection (or index marker) that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The aggregation pipeline contains a stage this store does not know.
    #[error("Unsupported aggregation stage: {0}")]
    UnsupportedStage(String),
    /// The filter document could not be parsed.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    /// A known aggregation stage has a malformed body.
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),
    /// A shell command could not be decoded.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    /// Serialization/deserialization error when converting between document formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A backend broke one of the guarantees the collection layer relies on.
    #[error("Internal backend error: {0}")]
    Internal(String),
}

impl DocumentStoreError {
    /// Short, stable name of the error kind, used by the command surface.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentStoreError::AlreadyExists(_) => "AlreadyExists",
            DocumentStoreError::DuplicateKey { .. } => "DuplicateKey",
            DocumentStoreError::InvalidUpdate(_) => "InvalidUpdate",
            DocumentStoreError::NotFound(_) => "NotFound",
            DocumentStoreError::UnsupportedStage(_) => "UnsupportedStage",
            DocumentStoreError::InvalidFilter(_) => "InvalidFilter",
            DocumentStoreError::InvalidPipeline(_) => "InvalidPipeline",
            DocumentStoreError::InvalidCommand(_) => "InvalidCommand",
            DocumentStoreError::Serialization(_) => "Serialization",
            DocumentStoreError::Internal(_) => "Internal",
        }
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

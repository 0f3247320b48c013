//! Convenient re-exports of commonly used types from docshell.
//!
//! ```ignore
//! use docshell::prelude::*;
//! ```
//!
//! This provides access to:
//! - The document store, collection handles and cursors
//! - Store backends and builders
//! - Filter, update and pipeline construction
//! - Shell commands and sessions
//! - Error types

pub use docshell_core::{
    aggregate::{Pipeline, Stage},
    backend::{StoreBackend, StoreBackendBuilder},
    collection::Collection,
    command::{Command, CommandOutput},
    cursor::Cursor,
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexModel,
    query::{Expr, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    result::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult},
    store::DocumentStore,
    update::UpdateSpec,
};

pub use crate::session::{RunOptions, Session};

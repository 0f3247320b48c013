//! Main docshell crate providing a shell-style interface to schema-less document collections.
//!
//! This crate is the primary entry point for users of the docshell project.
//! It re-exports the core types from the sub-crates, exposes the in-memory
//! backend, and provides the [`session`] that drives the `docshell` binary.
//!
//! # Features
//!
//! - **Schema-less collections** - Store any document shape, inconsistent field names included
//! - **Shell filter language** - `$gt`, `$in`, `$or`, dotted paths and array fan-out
//! - **Updates and deletes** - `$set`, `$unset` and `$inc`, on the first match or every match
//! - **Aggregation** - `$match`, `$group`, `$sort`, `$skip` and `$limit`
//! - **Command scripts** - Replay JSON command lines across several databases
//!
//! # Quick Start
//!
//! ```ignore
//! use docshell::{prelude::*, memory::InMemoryStore, bson::doc};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     store.create_collection("books").await?;
//!
//!     let books = store.collection("books");
//!     books
//!         .insert_many(vec![
//!             doc! { "title": "The hobbit", "genre": "Fantasy" },
//!             doc! { "title": "Chozi la kheri", "genre": "Fiction" },
//!         ])
//!         .await?;
//!
//!     books.update_many(doc! {}, doc! { "$set": { "rating": 4.5 } }).await?;
//!
//!     let per_genre = books
//!         .aggregate(&[doc! { "$group": { "_id": "$genre", "totalBooks": { "$sum": 1 } } }])
//!         .await?;
//!     println!("{per_genre:?}");
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Scripts
//!
//! The same operations are available as JSON command lines through
//! [`session::Session`]:
//!
//! ```text
//! {"op": "use", "database": "library"}
//! {"op": "insertOne", "collection": "books", "document": {"title": "Dolls House"}}
//! {"op": "find", "collection": "books", "filter": {"title": "Dolls House"}}
//! ```

pub mod prelude;
pub mod session;

pub use docshell_core::{
    aggregate, backend, collection, command, cursor, document, error, index, json, query, result, store, update,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docshell_memory::{IdKind, InMemoryStore, InMemoryStoreBuilder};
}

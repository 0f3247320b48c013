//! In-memory document storage backend for docshell.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses an async-aware read-write lock around the whole store and keeps every
//! collection in insertion order. Nothing is persisted.
//!
//! # Features
//!
//! - **Serialized access** - One RwLock for the store; operations never interleave
//! - **Schema-less storage** - Documents are stored as BSON documents, as inserted
//! - **Shell filter semantics** - Dotted paths, array fan-out and null-matches-missing
//! - **Aggregation** - `$match`, `$group`, `$sort`, `$skip` and `$limit`
//! - **Configurable ids** - Generated `_id`s are ObjectIds or UUID strings
//!
//! # Quick Start
//!
//! ```ignore
//! use docshell_core::{backend::StoreBackendBuilder, store::DocumentStore};
//! use docshell_memory::InMemoryStore;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend);
//!
//!     store.create_collection("books").await?;
//!     store
//!         .collection("books")
//!         .insert_one(doc! { "title": "Dolls House", "author": "Henrik Ibsen" })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

mod evaluator;
mod pipeline;
pub mod store;

pub use store::{IdKind, InMemoryStore, InMemoryStoreBuilder};

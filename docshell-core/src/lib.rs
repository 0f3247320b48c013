//! A schema-less document collection layer with a shell-style command surface.
//!
//! This crate is the core of the docshell project and provides:
//!
//! - **Documents** ([`document`]) - Dotted-path access and `_id` helpers over [`bson::Document`]
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Filters and queries** ([`query`]) - Filter language parser and query construction
//! - **Updates** ([`update`]) - `$set` / `$unset` / `$inc` update specifications
//! - **Aggregation** ([`aggregate`]) - Pipeline stages and accumulators
//! - **Collections interface** ([`collection`]) - High-level API for a named collection
//! - **Document store** ([`store`]) - Collection administration and handles
//! - **Commands** ([`command`]) - JSON shell commands and their rendered output
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use docshell_core::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! store.create_collection("books").await?;
//!
//! let books = store.collection("books");
//! books.insert_one(doc! { "title": "The hobbit", "genre": "Fantasy" }).await?;
//!
//! let per_genre = books
//!     .aggregate(&[doc! { "$group": { "_id": "$genre", "totalBooks": { "$sum": 1 } } }])
//!     .await?;
//! ```

pub mod aggregate;
pub mod backend;
pub mod collection;
pub mod command;
pub mod cursor;
pub mod document;
pub mod error;
pub mod index;
pub mod json;
pub mod query;
pub mod result;
pub mod store;
pub mod update;

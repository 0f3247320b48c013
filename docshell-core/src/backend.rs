//! Storage backend abstraction for the document store.
//!
//! The [`StoreBackend`] trait is the seam between the collection-level API and
//! whatever actually holds the documents. Handles in [`crate::collection`] and
//! [`crate::store`] parse shell-style arguments and delegate here with
//! already-validated filters, update specs and pipelines.
//!
//! # Examples
//!
//! ```ignore
//! use docshell::backend::StoreBackend;
//! use docshell::query::Query;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.create_collection("books").await?;
//! backend.insert_documents(vec![doc! { "title": "The hobbit" }], "books").await?;
//!
//! let all = backend.find_documents(Query::new(), "books").await?.collect::<Vec<_>>();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{
    aggregate::Pipeline,
    cursor::Cursor,
    error::DocumentStoreResult,
    index::IndexModel,
    query::{Expr, Query},
    result::{DeleteResult, UpdateResult, WriteScope},
    update::UpdateSpec,
};

/// Abstract interface for document storage backends.
///
/// # Ordering
///
/// Backends keep each collection in insertion order. Unsorted reads, and the
/// "first match" of single-document writes, follow that order.
///
/// # Concurrency
///
/// Every call runs to completion before the next one observes the store.
/// Implementations serialize access internally (one lock around the whole
/// store is enough); no call may expose a half-applied operation.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// The variants each method may return are listed on the method.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Creates a new, empty collection.
    ///
    /// Fails with `AlreadyExists` if the name is taken.
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Drops a collection with all its documents and index markers.
    ///
    /// Fails with `NotFound` if the collection does not exist.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists collection names in lexical order.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Appends documents to a collection, creating the collection if needed.
    ///
    /// Documents without `_id` receive a generated one. Documents are inserted
    /// one at a time: when a supplied `_id` collides the call fails with
    /// `DuplicateKey`, and the documents before it stay inserted.
    ///
    /// # Returns
    ///
    /// The `_id` of every inserted document, in batch order.
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Returns a cursor over the documents matching `query`.
    ///
    /// A missing collection yields an empty cursor.
    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Cursor>;

    /// Counts the documents matching `filter`.
    async fn count_documents(&self, filter: Expr, collection: &str) -> DocumentStoreResult<u64> {
        Ok(self
            .find_documents(Query::filtered(filter), collection)
            .await?
            .count() as u64)
    }

    /// Applies `update` to the first match or to every match.
    ///
    /// Matching nothing is not an error. Fails with `NotFound` if the
    /// collection does not exist, or `InvalidUpdate` if the update cannot be
    /// applied to a matched document, in which case no document is changed.
    async fn update_documents(
        &self,
        filter: Expr,
        update: UpdateSpec,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Removes the first match or every match.
    ///
    /// Matching nothing is not an error. Fails with `NotFound` if the
    /// collection does not exist.
    async fn delete_documents(
        &self,
        filter: Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<DeleteResult>;

    /// Runs an aggregation pipeline over the collection in insertion order.
    ///
    /// A missing collection is treated as empty.
    async fn aggregate(&self, pipeline: Pipeline, collection: &str) -> DocumentStoreResult<Vec<Document>>;

    /// Records an index marker and returns its name.
    ///
    /// Declaring the same marker twice returns the existing name. Fails with
    /// `NotFound` if the collection does not exist.
    async fn create_index(&self, index: IndexModel, collection: &str) -> DocumentStoreResult<String>;

    /// Lists the index markers of a collection in declaration order.
    async fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<IndexModel>>;

    /// Removes an index marker by name.
    ///
    /// Fails with `NotFound` if the collection or the marker does not exist.
    async fn drop_index(&self, name: &str, collection: &str) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Factory for configured backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}

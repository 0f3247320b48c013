//! Main document store interface.
//!
//! [`DocumentStore`] owns a backend and hands out [`Collection`] handles by
//! name. Collection-level administration (create, drop, list) lives here.
//!
//! # Example
//!
//! ```ignore
//! use docshell::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! store.create_collection("books").await?;
//! let books = store.collection("books");
//! ```

use tracing::debug;

use crate::{
    backend::StoreBackend,
    collection::Collection,
    error::DocumentStoreResult,
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Gets a handle to the named collection.
    ///
    /// The collection does not need to exist; inserting through the handle
    /// creates it.
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a, B> {
        Collection::new(name.to_string(), &self.backend)
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates a new, empty collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::AlreadyExists`](crate::error::DocumentStoreError::AlreadyExists)
    /// if the name is taken; re-creation is never silently accepted.
    pub async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend
            .create_collection(name)
            .await?;

        debug!(collection = name, "created collection");

        Ok(())
    }

    /// Drops a collection and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`](crate::error::DocumentStoreError::NotFound)
    /// if the collection does not exist.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend
            .drop_collection(name)
            .await?;

        debug!(collection = name, "dropped collection");

        Ok(())
    }

    /// Lists all collections in the store.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts down the store and releases backend resources.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}

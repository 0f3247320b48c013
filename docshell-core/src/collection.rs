//! Collection handles.
//!
//! A [`Collection`] is a lightweight, named view over a backend. Its methods
//! mirror the shell operations (`insertOne`, `find`, `updateMany`, ...) and take
//! shell-style documents for filters, updates and pipelines, which are parsed
//! and validated here before the backend is touched.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//!
//! # async fn example(store: &docshell::store::DocumentStore<impl docshell::backend::StoreBackend>) -> docshell::error::DocumentStoreResult<()> {
//! let books = store.collection("books");
//!
//! books.insert_one(doc! { "title": "Dolls House", "author": "Henrik Ibsen" }).await?;
//! books
//!     .update_one(doc! { "title": "Dolls House" }, doc! { "$set": { "publishedYear": 1879 } })
//!     .await?;
//!
//! let ibsen = books.find(doc! { "author": "Henrik Ibsen" }).await?.collect::<Vec<_>>();
//! # Ok(()) }
//! ```

use bson::Document;
use tracing::debug;

use crate::{
    aggregate::Pipeline,
    backend::StoreBackend,
    cursor::Cursor,
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexModel,
    query::{Expr, Query, SortDirection},
    result::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult, WriteScope},
    update::UpdateSpec,
};

/// A named collection bound to a storage backend.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts one document, generating `_id` if it is missing.
    ///
    /// The collection is created if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DuplicateKey`] if the `_id` is taken.
    pub async fn insert_one(&self, document: Document) -> DocumentStoreResult<InsertOneResult> {
        let inserted_id = self
            .backend
            .insert_documents(vec![document], self.name())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DocumentStoreError::Internal("backend returned no inserted id".to_string()))?;

        debug!(collection = %self.name, id = %inserted_id, "inserted one document");

        Ok(InsertOneResult { inserted_id })
    }

    /// Inserts documents in order.
    ///
    /// The batch is not atomic: if a document fails with
    /// [`DocumentStoreError::DuplicateKey`], the documents before it remain inserted.
    pub async fn insert_many(&self, documents: Vec<Document>) -> DocumentStoreResult<InsertManyResult> {
        let requested = documents.len();
        let inserted_ids = self
            .backend
            .insert_documents(documents, self.name())
            .await?;

        debug!(collection = %self.name, requested, inserted = inserted_ids.len(), "inserted documents");

        Ok(InsertManyResult { inserted_ids })
    }

    /// Returns a cursor over the documents matching a shell filter.
    ///
    /// An empty filter matches everything. Results come back in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidFilter`] if the filter cannot be parsed.
    pub async fn find(&self, filter: Document) -> DocumentStoreResult<Cursor> {
        self.query(Query::filtered(Expr::parse(&filter)?)).await
    }

    /// Runs a structured query (filter plus optional sort, skip and limit).
    pub async fn query(&self, query: Query) -> DocumentStoreResult<Cursor> {
        self.backend
            .find_documents(query, self.name())
            .await
    }

    /// Returns the first document matching a shell filter, if any.
    pub async fn find_one(&self, filter: Document) -> DocumentStoreResult<Option<Document>> {
        let query = Query::builder()
            .filter(Expr::parse(&filter)?)
            .limit(1)
            .build();

        Ok(self.query(query).await?.next())
    }

    /// Counts the documents matching a shell filter.
    pub async fn count_documents(&self, filter: Document) -> DocumentStoreResult<u64> {
        self.backend
            .count_documents(Expr::parse(&filter)?, self.name())
            .await
    }

    /// Applies an update to the first matching document.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidUpdate`] if the update is empty or malformed
    /// - [`DocumentStoreError::NotFound`] if the collection does not exist
    pub async fn update_one(&self, filter: Document, update: Document) -> DocumentStoreResult<UpdateResult> {
        self.update(filter, update, WriteScope::One).await
    }

    /// Applies an update to every matching document.
    ///
    /// The update is validated before any document is touched.
    pub async fn update_many(&self, filter: Document, update: Document) -> DocumentStoreResult<UpdateResult> {
        self.update(filter, update, WriteScope::Many).await
    }

    async fn update(&self, filter: Document, update: Document, scope: WriteScope) -> DocumentStoreResult<UpdateResult> {
        let update = UpdateSpec::parse(&update)?;
        let filter = Expr::parse(&filter)?;
        let result = self
            .backend
            .update_documents(filter, update, scope, self.name())
            .await?;

        debug!(
            collection = %self.name,
            ?scope,
            matched = result.matched_count,
            modified = result.modified_count,
            "updated documents"
        );

        Ok(result)
    }

    /// Removes the first matching document.
    pub async fn delete_one(&self, filter: Document) -> DocumentStoreResult<DeleteResult> {
        self.delete(filter, WriteScope::One).await
    }

    /// Removes every matching document.
    pub async fn delete_many(&self, filter: Document) -> DocumentStoreResult<DeleteResult> {
        self.delete(filter, WriteScope::Many).await
    }

    async fn delete(&self, filter: Document, scope: WriteScope) -> DocumentStoreResult<DeleteResult> {
        let filter = Expr::parse(&filter)?;
        let result = self
            .backend
            .delete_documents(filter, scope, self.name())
            .await?;

        debug!(collection = %self.name, ?scope, deleted = result.deleted_count, "deleted documents");

        Ok(result)
    }

    /// Runs a shell aggregation pipeline.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::UnsupportedStage`] for unknown stage names
    /// - [`DocumentStoreError::InvalidPipeline`] for malformed stages
    pub async fn aggregate(&self, pipeline: &[Document]) -> DocumentStoreResult<Vec<Document>> {
        self.aggregate_pipeline(Pipeline::parse(pipeline)?).await
    }

    /// Runs an already-built pipeline.
    pub async fn aggregate_pipeline(&self, pipeline: Pipeline) -> DocumentStoreResult<Vec<Document>> {
        self.backend
            .aggregate(pipeline, self.name())
            .await
    }

    /// Records an index marker on `field` and returns its name.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] if the collection does not exist.
    pub async fn create_index(&self, field: &str, direction: SortDirection) -> DocumentStoreResult<String> {
        let name = self
            .backend
            .create_index(IndexModel::new(field, direction), self.name())
            .await?;

        debug!(collection = %self.name, index = %name, "recorded index marker");

        Ok(name)
    }

    /// Lists the index markers of this collection.
    pub async fn list_indexes(&self) -> DocumentStoreResult<Vec<IndexModel>> {
        self.backend.list_indexes(self.name()).await
    }

    /// Removes an index marker by name.
    pub async fn drop_index(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend
            .drop_index(name, self.name())
            .await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bson::{Bson, doc};

    use super::*;

    /// Backend that accepts every insert without reporting any ids.
    #[derive(Debug)]
    struct SilentBackend;

    #[async_trait]
    impl StoreBackend for SilentBackend {
        async fn create_collection(&self, _name: &str) -> DocumentStoreResult<()> {
            Ok(())
        }

        async fn drop_collection(&self, _name: &str) -> DocumentStoreResult<()> {
            Ok(())
        }

        async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn insert_documents(&self, _documents: Vec<Document>, _collection: &str) -> DocumentStoreResult<Vec<Bson>> {
            Ok(Vec::new())
        }

        async fn find_documents(&self, _query: Query, _collection: &str) -> DocumentStoreResult<Cursor> {
            Ok(Cursor::empty())
        }

        async fn update_documents(
            &self,
            _filter: Expr,
            _update: UpdateSpec,
            _scope: WriteScope,
            _collection: &str,
        ) -> DocumentStoreResult<UpdateResult> {
            Ok(UpdateResult::default())
        }

        async fn delete_documents(&self, _filter: Expr, _scope: WriteScope, _collection: &str) -> DocumentStoreResult<DeleteResult> {
            Ok(DeleteResult::default())
        }

        async fn aggregate(&self, _pipeline: Pipeline, _collection: &str) -> DocumentStoreResult<Vec<Document>> {
            Ok(Vec::new())
        }

        async fn create_index(&self, index: IndexModel, _collection: &str) -> DocumentStoreResult<String> {
            Ok(index.name)
        }

        async fn list_indexes(&self, _collection: &str) -> DocumentStoreResult<Vec<IndexModel>> {
            Ok(Vec::new())
        }

        async fn drop_index(&self, _name: &str, _collection: &str) -> DocumentStoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn missing_inserted_id_is_an_internal_error() {
        let backend = SilentBackend;
        let books = Collection::new("books".to_string(), &backend);

        let err = books.insert_one(doc! { "title": "Ghosts" }).await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::Internal(_)));
        assert_eq!(err.kind(), "Internal");
    }
}

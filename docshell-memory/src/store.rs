//! In-memory storage implementation for document stores.
//!
//! Collections are ordered vectors of documents kept behind a single
//! async-aware read-write lock, so every operation observes the store either
//! fully before or fully after any other operation.

use std::{collections::BTreeMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, oid::ObjectId};
use tracing::trace;

use docshell_core::{
    aggregate::Pipeline,
    backend::{StoreBackend, StoreBackendBuilder},
    cursor::Cursor,
    document::{document_id, render_id, with_leading_id},
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexModel,
    query::{Expr, Query},
    result::{DeleteResult, UpdateResult, WriteScope},
    update::UpdateSpec,
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, sort_documents},
    pipeline,
};

/// Kind of `_id` generated for documents inserted without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdKind {
    /// A fresh [`ObjectId`], like the shell's `ObjectId()`.
    #[default]
    ObjectId,
    /// A random UUID v4 rendered as a string.
    Uuid,
}

impl IdKind {
    /// Generates a new unique id value.
    pub fn generate(&self) -> Bson {
        match self {
            IdKind::ObjectId => Bson::ObjectId(ObjectId::new()),
            IdKind::Uuid => Bson::String(uuid::Uuid::new_v4().to_string()),
        }
    }
}

/// One collection: documents in insertion order plus declared index markers.
#[derive(Debug, Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexModel>,
}

impl CollectionState {
    /// Whether a document with an equal `_id` is stored; `1` and `1.0` are equal.
    fn contains_id(&self, id: &Bson) -> bool {
        let id = Comparable::from(id);

        self.documents
            .iter()
            .filter_map(document_id)
            .any(|existing| Comparable::from(existing) == id)
    }
}

type StoreMap = BTreeMap<String, CollectionState>;

fn collection_not_found(collection: &str) -> DocumentStoreError {
    DocumentStoreError::NotFound(format!("collection '{collection}'"))
}

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait and keeps every
/// collection as an insertion-ordered list of BSON documents. Queries scan
/// the whole collection; index markers are recorded but never consulted.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Example
///
/// ```ignore
/// use docshell_memory::InMemoryStore;
/// use docshell_core::{backend::StoreBackend, query::Query};
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     let ids = store.insert_documents(vec![doc! { "name": "mark", "userId": 1 }], "users").await?;
///     assert_eq!(ids.len(), 1);
///
///     let users = store.find_documents(Query::new(), "users").await?.collect::<Vec<_>>();
///     assert_eq!(users[0].get("_id"), Some(&ids[0]));
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> collection state, listed in lexical order
    store: Arc<RwLock<StoreMap>>,
    id_kind: IdKind,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store that generates object ids.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docshell_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::new();
    /// assert!(store.list_collections().await.unwrap().is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_id_kind(IdKind::default())
    }

    fn with_id_kind(id_kind: IdKind) -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            id_kind,
        }
    }

    /// Creates a builder for constructing an `InMemoryStore` with custom options.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docshell_memory::{IdKind, InMemoryStore};
    ///
    /// let store = InMemoryStore::builder().id_kind(IdKind::Uuid).build().await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// The kind of `_id` this store generates.
    pub fn id_kind(&self) -> IdKind {
        self.id_kind
    }

    async fn snapshot(&self, collection: &str) -> Option<Vec<Document>> {
        self.store
            .read()
            .await
            .get(collection)
            .map(|state| state.documents.clone())
    }
}


#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.contains_key(name) {
            return Err(DocumentStoreError::AlreadyExists(name.to_string()));
        }

        store.insert(name.to_string(), CollectionState::default());

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(collection_not_found(name));
        }

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(
            self.store
                .read()
                .await
                .keys()
                .cloned()
                .collect()
        )
    }

    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let mut store = self.store.write().await;
        let state = store
            .entry(collection.to_string())
            .or_default();

        let mut ids = Vec::with_capacity(documents.len());

        for document in documents {
            let (id, document) = match document_id(&document).cloned() {
                Some(id) => (id, document),
                None => {
                    let id = self.id_kind.generate();
                    (id.clone(), with_leading_id(document, id))
                }
            };

            // Earlier documents of the batch stay inserted.
            if state.contains_id(&id) {
                return Err(DocumentStoreError::DuplicateKey {
                    id: render_id(&id),
                    collection: collection.to_string(),
                });
            }

            state.documents.push(document);
            ids.push(id);
        }

        trace!(collection, inserted = ids.len(), total = state.documents.len(), "appended documents");

        Ok(ids)
    }

    async fn find_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Cursor> {
        let Some(documents) = self.snapshot(collection).await else {
            return Ok(Cursor::empty());
        };

        trace!(collection, scanned = documents.len(), "scanning collection");

        let Query { filter, sort, skip, limit } = query;
        let filter = filter.unwrap_or_else(|| Expr::And(Vec::new()));
        let skip = skip.unwrap_or(0);
        let limit = limit.unwrap_or(usize::MAX);

        // Without a sort the scan stays lazy.
        if sort.is_empty() {
            return Ok(Cursor::new(
                documents
                    .into_iter()
                    .filter(move |document| DocumentEvaluator::matches(document, &filter))
                    .skip(skip)
                    .take(limit)
            ));
        }

        let mut matched = documents
            .into_iter()
            .filter(|document| DocumentEvaluator::matches(document, &filter))
            .collect::<Vec<_>>();

        sort_documents(&mut matched, &sort);

        Ok(Cursor::new(
            matched
                .into_iter()
                .skip(skip)
                .take(limit)
        ))
    }

    async fn update_documents(
        &self,
        filter: Expr,
        update: UpdateSpec,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<UpdateResult> {
        let mut store = self.store.write().await;
        let state = store
            .get_mut(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        // Updated copies are computed first so a failure leaves every document untouched.
        let mut changes = Vec::new();
        let mut matched_count = 0;

        for (position, document) in state.documents.iter().enumerate() {
            if !DocumentEvaluator::matches(document, &filter) {
                continue;
            }

            matched_count += 1;

            let mut updated = document.clone();
            if update.apply(&mut updated)? {
                changes.push((position, updated));
            }

            if scope == WriteScope::One {
                break;
            }
        }

        let modified_count = changes.len() as u64;

        for (position, updated) in changes {
            state.documents[position] = updated;
        }

        trace!(collection, matched_count, modified_count, "applied update");

        Ok(UpdateResult { matched_count, modified_count })
    }

    async fn delete_documents(
        &self,
        filter: Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<DeleteResult> {
        let mut store = self.store.write().await;
        let state = store
            .get_mut(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        let deleted_count = match scope {
            WriteScope::One => {
                match state
                    .documents
                    .iter()
                    .position(|document| DocumentEvaluator::matches(document, &filter))
                {
                    Some(position) => {
                        state.documents.remove(position);
                        1
                    }
                    None => 0,
                }
            }
            WriteScope::Many => {
                let before = state.documents.len();
                state
                    .documents
                    .retain(|document| !DocumentEvaluator::matches(document, &filter));
                (before - state.documents.len()) as u64
            }
        };

        trace!(collection, deleted_count, remaining = state.documents.len(), "removed documents");

        Ok(DeleteResult { deleted_count })
    }

    async fn aggregate(&self, pipeline: Pipeline, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let documents = self
            .snapshot(collection)
            .await
            .unwrap_or_default();

        trace!(collection, stages = pipeline.stages().len(), input = documents.len(), "running pipeline");

        pipeline::execute(&pipeline, documents)
    }

    async fn create_index(&self, index: IndexModel, collection: &str) -> DocumentStoreResult<String> {
        let mut store = self.store.write().await;
        let state = store
            .get_mut(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        if !state.indexes.iter().any(|existing| existing.name == index.name) {
            state.indexes.push(index.clone());
        }

        Ok(index.name)
    }

    async fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<IndexModel>> {
        self.store
            .read()
            .await
            .get(collection)
            .map(|state| state.indexes.clone())
            .ok_or_else(|| collection_not_found(collection))
    }

    async fn drop_index(&self, name: &str, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let state = store
            .get_mut(collection)
            .ok_or_else(|| collection_not_found(collection))?;

        let before = state.indexes.len();
        state.indexes.retain(|index| index.name != name);

        if state.indexes.len() == before {
            return Err(DocumentStoreError::NotFound(format!(
                "index '{name}' on collection '{collection}'"
            )));
        }

        Ok(())
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docshell_memory::{IdKind, InMemoryStore};
/// use docshell_core::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().id_kind(IdKind::Uuid).build().await.unwrap();
/// }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    id_kind: IdKind,
}

impl InMemoryStoreBuilder {
    /// Sets the kind of `_id` generated for documents inserted without one.
    pub fn id_kind(mut self, id_kind: IdKind) -> Self {
        self.id_kind = id_kind;
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::with_id_kind(self.id_kind))
    }
}

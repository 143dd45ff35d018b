//! In-memory storage implementation for the mapping layer.
//!
//! This module provides a simple but complete in-memory backend that stores
//! documents as BSON in HashMaps with async-safe read-write locks.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;

use odmlayer_core::{
    backend::{BackendCursor, CursorConfig, StoreBackend, StoreBackendBuilder},
    error::{OdmError, OdmResult},
    path::{remove_path, set_path},
};

use crate::matcher::{compare_on, matches};

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait to provide a fully
/// functional backend that operates entirely in memory using async-aware
/// read-write locks.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state,
/// allowing it to be safely shared across async tasks. Multiple clones of the
/// same instance share the same underlying data.
///
/// # Performance
///
/// Reads scan all documents in a collection (no indexing). For small to
/// medium datasets this is typically acceptable; for larger datasets use a
/// persistent backend.
///
/// # Example
///
/// ```ignore
/// use odmlayer_memory::InMemoryStore;
/// use odmlayer::backend::StoreBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     let stored = store
///         .insert_one(doc! { "name": "Alice" }, "users")
///         .await?;
///     assert!(stored.get_object_id("_id").is_ok());
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: collection_name -> documents
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find_many(
        &self,
        filter: Document,
        collection: &str,
    ) -> OdmResult<Box<dyn BackendCursor>> {
        let store = self.store.read().await;
        let matched = store
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches(doc, &filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::new(MemoryCursor::new(matched)))
    }

    async fn insert_one(&self, document: Document, collection: &str) -> OdmResult<Document> {
        let mut document = document;
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }

        let mut store = self.store.write().await;
        store
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());

        Ok(document)
    }

    async fn update_many(
        &self,
        filter: Document,
        patch: Document,
        collection: &str,
    ) -> OdmResult<u64> {
        let mut store = self.store.write().await;
        let Some(docs) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut matched = 0;
        for doc in docs.iter_mut() {
            if !matches(doc, &filter) {
                continue;
            }
            matched += 1;

            for (op, spec) in &patch {
                let Bson::Document(spec) = spec else {
                    return Err(OdmError::Backend(format!(
                        "malformed update specification for '{op}'"
                    )));
                };

                match op.as_str() {
                    "$set" => {
                        for (path, value) in spec {
                            set_path(doc, path, value.clone())?;
                        }
                    }
                    "$unset" => {
                        for (path, _) in spec {
                            remove_path(doc, path)?;
                        }
                    }
                    other => {
                        return Err(OdmError::Backend(format!(
                            "unsupported update operator '{other}'"
                        )));
                    }
                }
            }
        }

        Ok(matched)
    }

    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<()> {
        let mut store = self.store.write().await;
        if let Some(docs) = store.get_mut(collection) {
            if let Some(position) = docs.iter().position(|doc| matches(doc, &filter)) {
                docs.remove(position);
            }
        }

        Ok(())
    }
}

/// Cursor over the documents matched by an in-memory read.
///
/// Sorting, skip, and limit apply lazily on first advance; batch size, index
/// hints, and query plans are meaningless for an in-memory scan and are
/// reported unsupported.
struct MemoryCursor {
    matched: Vec<Document>,
    view: Option<Vec<Document>>,
    position: usize,
    sort: Option<Document>,
    skip: u64,
    limit: Option<u64>,
}

impl MemoryCursor {
    fn new(matched: Vec<Document>) -> Self {
        Self {
            matched,
            view: None,
            position: 0,
            sort: None,
            skip: 0,
            limit: None,
        }
    }

    fn prepare(&mut self) -> &[Document] {
        if self.view.is_none() {
            let mut docs = self.matched.clone();

            if let Some(spec) = &self.sort {
                docs.sort_by(|a, b| {
                    for (path, direction) in spec {
                        let descending = matches!(direction, Bson::Int32(d) if *d < 0)
                            || matches!(direction, Bson::Int64(d) if *d < 0)
                            || matches!(direction, Bson::Double(d) if *d < 0.0);

                        let ordering = if descending {
                            compare_on(b, a, path)
                        } else {
                            compare_on(a, b, path)
                        };
                        if ordering != Ordering::Equal {
                            return ordering;
                        }
                    }

                    Ordering::Equal
                });
            }

            let mut docs: Vec<Document> = docs
                .into_iter()
                .skip(self.skip as usize)
                .collect();
            if let Some(limit) = self.limit {
                docs.truncate(limit as usize);
            }

            self.view = Some(docs);
        }

        self.view.as_deref().unwrap_or_default()
    }
}

#[async_trait]
impl BackendCursor for MemoryCursor {
    fn configure(&mut self, config: CursorConfig) -> bool {
        match config {
            CursorConfig::Limit(limit) => self.limit = Some(limit),
            CursorConfig::Skip(skip) => self.skip = skip,
            CursorConfig::Sort(spec) => self.sort = Some(spec),
            CursorConfig::BatchSize(_) | CursorConfig::Hint(_) => return false,
        }

        // Reconfiguration invalidates any prepared view.
        self.view = None;
        self.position = 0;

        true
    }

    async fn advance(&mut self) -> OdmResult<Option<Document>> {
        let position = self.position;
        let next = self.prepare().get(position).cloned();
        if next.is_some() {
            self.position += 1;
        }

        Ok(next)
    }

    // Counts the full match set, before skip and limit are applied.
    async fn count(&mut self) -> OdmResult<Option<u64>> {
        Ok(Some(self.matched.len() as u64))
    }

    fn rewind(&mut self) {
        self.position = 0;
    }
}

/// Builder producing [`InMemoryStore`] instances.
#[derive(Default, Debug)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> OdmResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

//! Storage backend abstraction for the mapping layer.
//!
//! This module defines the traits that decouple record persistence from any
//! concrete document store, allowing the repository to work with in-memory,
//! remote, or test backends interchangeably.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait provides a unified async interface for the four
//! storage operations the persistence orchestrator needs: filtered reads via
//! a cursor, single-document inserts, multi-document partial updates, and
//! single-document deletes. Implementations are required to be thread-safe
//! (`Send + Sync`) and support concurrent access.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`BackendCursor`]: Incremental traversal over a filtered read
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use odmlayer::backend::StoreBackend;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! let stored = backend
//!     .insert_one(doc! { "name": "Alice", "age": 30 }, "users")
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::error::OdmResult;

/// A single cursor configuration request.
///
/// Configuration is applied through [`BackendCursor::configure`], which
/// reports whether the backend honored the request. Unsupported requests are
/// expected to be ignored by the backend, not fail the traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorConfig {
    /// Cap the number of documents the cursor will yield.
    Limit(u64),
    /// Skip this many matching documents before yielding.
    Skip(u64),
    /// Sort specification, field name to direction (`1` / `-1`).
    Sort(Document),
    /// Preferred fetch batch size.
    BatchSize(u32),
    /// Index hint for the underlying query planner.
    Hint(Document),
}

/// Incremental traversal over the result of a filtered read.
///
/// A cursor is configured before the first [`advance`](Self::advance); once
/// traversal has started, further configuration is backend-defined.
/// [`rewind`](Self::rewind) restarts traversal from the first result, and the
/// backend may re-execute the underlying read to honor it.
#[async_trait]
pub trait BackendCursor: Send {
    /// Applies one configuration request.
    ///
    /// Returns `true` when the backend honored the request and `false` when
    /// the option is unsupported; unsupported options must leave the cursor
    /// in a usable state.
    fn configure(&mut self, config: CursorConfig) -> bool;

    /// Yields the next matching document, or `None` when exhausted.
    async fn advance(&mut self) -> OdmResult<Option<Document>>;

    /// Counts the documents matching the cursor's filter, ignoring any limit
    /// or skip already configured and without consuming the traversal.
    ///
    /// Returns `Ok(None)` when the backend cannot count; the default
    /// implementation reports exactly that.
    async fn count(&mut self) -> OdmResult<Option<u64>> {
        Ok(None)
    }

    /// Reports the backend's execution plan for the underlying query.
    ///
    /// Returns `Ok(None)` when the backend has no plan to report; the default
    /// implementation reports exactly that.
    async fn explain(&mut self) -> OdmResult<Option<Document>> {
        Ok(None)
    }

    /// Restarts traversal from the first result.
    fn rewind(&mut self);
}

/// Abstract interface for document storage backends.
///
/// Implementers of this trait provide concrete storage strategies, from a
/// simple in-memory map to a remote database driver. The trait defines the
/// minimal operations record persistence is built from.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from
/// multiple async tasks. The exact concurrency model is implementation
/// specific but should be documented by the implementer.
///
/// # Error Handling
///
/// Operations return [`OdmResult<T>`](crate::error::OdmResult). Implementers
/// should document which error variants may be returned by each operation.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Executes a filtered read against a collection, returning a cursor over
    /// the matching documents.
    ///
    /// # Arguments
    ///
    /// * `filter` - A filter document in operator syntax (`$eq` implied for
    ///   plain values)
    /// * `collection` - The name of the collection to read from
    async fn find_many(
        &self,
        filter: Document,
        collection: &str,
    ) -> OdmResult<Box<dyn BackendCursor>>;

    /// Inserts a single document, returning the stored form.
    ///
    /// The backend assigns a fresh `_id` when the document carries none; the
    /// returned document always includes the identifier.
    ///
    /// # Arguments
    ///
    /// * `document` - The document to insert
    /// * `collection` - The name of the collection to insert into, created
    ///   automatically if it doesn't exist
    async fn insert_one(&self, document: Document, collection: &str) -> OdmResult<Document>;

    /// Applies a partial-update patch (`$set` / `$unset`) to every document
    /// matching `filter`, returning the number of documents matched.
    ///
    /// A zero return is not an error at this layer; the caller decides what a
    /// missing target means.
    ///
    /// # Arguments
    ///
    /// * `filter` - Selects the documents to update
    /// * `patch` - The update document, keyed by operator
    /// * `collection` - The name of the collection containing the documents
    async fn update_many(
        &self,
        filter: Document,
        patch: Document,
        collection: &str,
    ) -> OdmResult<u64>;

    /// Deletes the first document matching `filter`. Deleting a document that
    /// doesn't exist is not an error (idempotent operation).
    ///
    /// # Arguments
    ///
    /// * `filter` - Selects the document to delete
    /// * `collection` - The name of the collection to delete from
    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with persistent
    /// storage or external connections should override this.
    async fn shutdown(self) -> OdmResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn find_many(
        &self,
        filter: Document,
        collection: &str,
    ) -> OdmResult<Box<dyn BackendCursor>> {
        (*self).find_many(filter, collection).await
    }

    async fn insert_one(&self, document: Document, collection: &str) -> OdmResult<Document> {
        (*self)
            .insert_one(document, collection)
            .await
    }

    async fn update_many(
        &self,
        filter: Document,
        patch: Document,
        collection: &str,
    ) -> OdmResult<u64> {
        (*self)
            .update_many(filter, patch, collection)
            .await
    }

    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<()> {
        (*self)
            .delete_one(filter, collection)
            .await
    }
}

#[async_trait]
impl<B> StoreBackend for &mut B
where
    B: StoreBackend,
{
    async fn find_many(
        &self,
        filter: Document,
        collection: &str,
    ) -> OdmResult<Box<dyn BackendCursor>> {
        (**self).find_many(filter, collection).await
    }

    async fn insert_one(&self, document: Document, collection: &str) -> OdmResult<Document> {
        (**self)
            .insert_one(document, collection)
            .await
    }

    async fn update_many(
        &self,
        filter: Document,
        patch: Document,
        collection: &str,
    ) -> OdmResult<u64> {
        (**self)
            .update_many(filter, patch, collection)
            .await
    }

    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<()> {
        (**self)
            .delete_one(filter, collection)
            .await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> OdmResult<Self::Backend>;
}

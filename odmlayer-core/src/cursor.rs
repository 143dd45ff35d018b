//! Typed traversal over query results.
//!
//! A [`RecordCursor`] wraps a backend cursor and hydrates each raw document
//! into a [`Record`] as it is consumed. Configuration is chainable and
//! forgiving: options the backend does not support are logged and dropped
//! rather than failing the traversal, so callers can tune queries without
//! caring which backend is underneath.

use bson::Document;

use crate::{
    backend::{BackendCursor, CursorConfig},
    error::{OdmError, OdmResult},
    model::Model,
    record::Record,
};

/// A cursor over records of type `M`, hydrating lazily.
///
/// Requested preload capabilities run against each record immediately after
/// hydration, before the record is handed to the caller.
pub struct RecordCursor<M: Model> {
    inner: Box<dyn BackendCursor>,
    preloads: Vec<String>,
    _marker: std::marker::PhantomData<M>,
}

impl<M: Model> RecordCursor<M> {
    /// Wraps a backend cursor.
    pub fn new(inner: Box<dyn BackendCursor>) -> Self {
        Self {
            inner,
            preloads: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    fn configure(mut self, config: CursorConfig) -> Self {
        if !self.inner.configure(config.clone()) {
            tracing::warn!(
                model = M::collection_name(),
                ?config,
                "cursor option not supported by backend, ignoring"
            );
        }
        self
    }

    /// Caps the number of records the cursor will yield.
    pub fn limit(self, limit: u64) -> Self {
        self.configure(CursorConfig::Limit(limit))
    }

    /// Skips the first `skip` matching records.
    pub fn skip(self, skip: u64) -> Self {
        self.configure(CursorConfig::Skip(skip))
    }

    /// Sorts results by the given specification (field name to `1` / `-1`).
    pub fn sort(self, spec: Document) -> Self {
        self.configure(CursorConfig::Sort(spec))
    }

    /// Requests a fetch batch size from the backend.
    pub fn batch_size(self, size: u32) -> Self {
        self.configure(CursorConfig::BatchSize(size))
    }

    /// Supplies an index hint to the backend's query planner.
    pub fn hint(self, hint: Document) -> Self {
        self.configure(CursorConfig::Hint(hint))
    }

    /// Requests named capabilities to run against each record on hydration.
    pub fn preload<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preloads
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Restarts traversal from the first result.
    pub fn rewind(&mut self) {
        self.inner.rewind();
    }

    /// Counts the records matching the underlying query, ignoring any limit
    /// or skip already configured and without consuming the cursor.
    ///
    /// Backends that cannot count report `None`; like the configuration
    /// passthroughs, that degrades to a logged no-op rather than a failure.
    pub async fn count(&mut self) -> OdmResult<Option<u64>> {
        let count = self.inner.count().await?;
        if count.is_none() {
            tracing::warn!(
                model = M::collection_name(),
                "cursor count not supported by backend, ignoring"
            );
        }

        Ok(count)
    }

    /// Reports the backend's execution plan for the underlying query.
    ///
    /// Backends with no plan to report yield `None` with a logged notice.
    pub async fn explain(&mut self) -> OdmResult<Option<Document>> {
        let plan = self.inner.explain().await?;
        if plan.is_none() {
            tracing::warn!(
                model = M::collection_name(),
                "cursor explain not supported by backend, ignoring"
            );
        }

        Ok(plan)
    }

    /// Yields the next record, or `None` when the cursor is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates backend read failures, [`OdmError::Argument`] for an
    /// unregistered preload name, and any error a preload capability returns.
    pub async fn next(&mut self) -> OdmResult<Option<Record<M>>> {
        let Some(raw) = self.inner.advance().await? else {
            return Ok(None);
        };

        let mut record = Record::hydrate(&raw);
        self.run_preloads(&mut record).await?;

        Ok(Some(record))
    }

    async fn run_preloads(&self, record: &mut Record<M>) -> OdmResult<()> {
        if self.preloads.is_empty() {
            return Ok(());
        }

        let Some(registry) = M::capabilities() else {
            return Err(OdmError::Argument(format!(
                "model '{}' registers no capabilities, cannot preload {:?}",
                M::collection_name(),
                self.preloads
            )));
        };

        registry.invoke(record, &self.preloads).await
    }

    /// Invokes `f` on every remaining record, in order.
    pub async fn for_each<F>(&mut self, mut f: F) -> OdmResult<()>
    where
        F: FnMut(Record<M>),
    {
        while let Some(record) = self.next().await? {
            f(record);
        }

        Ok(())
    }

    /// Drains the cursor into a vector, hydrating sequentially.
    ///
    /// Sequential on purpose: preload capabilities may hit storage themselves
    /// and the per-record ordering guarantee is part of the contract.
    pub async fn to_array(mut self) -> OdmResult<Vec<Record<M>>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }

        Ok(records)
    }
}

impl<M: Model> std::fmt::Debug for RecordCursor<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCursor")
            .field("model", &M::collection_name())
            .field("preloads", &self.preloads)
            .finish_non_exhaustive()
    }
}

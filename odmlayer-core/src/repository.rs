//! The persistence orchestrator: saving, reloading, destroying, and finding
//! records through a storage backend.
//!
//! A [`ModelStore`] owns a backend and hands out per-model [`Repository`]
//! handles that borrow it. The repository drives the full save pipeline —
//! validation, save hooks, context cleaning, timestamp stamping, diff
//! synthesis, and the post-write reload that realigns both snapshots with
//! storage.

use bson::{Bson, Document, doc};

use crate::{
    backend::StoreBackend,
    cursor::RecordCursor,
    error::{OdmError, OdmResult},
    model::Model,
    path::flatten,
    record::{Record, coerce_object_id},
};

/// Options steering one save invocation.
///
/// The defaults run the full pipeline: validation on, cleaning against the
/// default context. `context` selects which writable context cleaning
/// resolves against.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub context: Option<String>,
    pub skip_validation: bool,
    pub skip_clean: bool,
}

impl SaveOptions {
    /// The default pipeline: validate, clean against the default context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cleans against the named context instead of the default.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Skips the validation step.
    pub fn skipping_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    /// Skips the context-cleaning step, letting every dirty path through.
    pub fn skipping_clean(mut self) -> Self {
        self.skip_clean = true;
        self
    }
}

/// A store bound to a specific backend implementation.
///
/// # Example
///
/// ```ignore
/// let store = ModelStore::new(backend);
/// let users = store.repository::<User>();
/// ```
#[derive(Debug)]
pub struct ModelStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> ModelStore<B> {
    /// Creates a store over the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// A repository handle for model type `M`, borrowing this store.
    pub fn repository<M: Model>(&self) -> Repository<'_, B, M> {
        Repository::new(&self.backend)
    }

    /// Shuts down the store and releases backend resources.
    pub async fn shutdown(self) -> OdmResult<()> {
        self.backend.shutdown().await
    }
}

/// Persistence operations for one model type against a borrowed backend.
pub struct Repository<'a, B: StoreBackend, M: Model> {
    backend: &'a B,
    _marker: std::marker::PhantomData<M>,
}

impl<B: StoreBackend, M: Model> std::fmt::Debug for Repository<'_, B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("model", &M::collection_name())
            .field("backend", &self.backend)
            .finish()
    }
}

impl<'a, B: StoreBackend, M: Model> Repository<'a, B, M> {
    pub(crate) fn new(backend: &'a B) -> Self {
        Self {
            backend,
            _marker: std::marker::PhantomData,
        }
    }

    /// Saves a record, running the full pipeline.
    ///
    /// Validation failures abort before any hook runs. A never-saved record
    /// is stamped with `created_at` and inserted; a persisted record has its
    /// minimal patch applied to the document matching its identifier. Either
    /// way the record is reloaded from storage afterwards, so both snapshots
    /// reflect exactly what the backend holds.
    ///
    /// # Errors
    ///
    /// - [`OdmError::Validation`] listing the failing fields
    /// - [`OdmError::Persistence`] when the record was destroyed, or when the
    ///   targeted document no longer exists in storage
    /// - [`OdmError::Identifier`] when a persisted record carries no usable
    ///   identifier
    pub async fn save(&self, record: &mut Record<M>, options: &SaveOptions) -> OdmResult<()> {
        if record.is_destroyed() {
            return Err(self.no_records_updated());
        }

        if !options.skip_validation {
            let failing = M::validate(record);
            if !failing.is_empty() {
                return Err(OdmError::Validation(
                    M::collection_name().to_string(),
                    failing,
                ));
            }
        }

        for hook in M::save_hooks() {
            hook.before_save(record).await?;
        }

        if !options.skip_clean {
            record.clean(options.context.as_deref())?;
        }

        record.set("updated_at", bson::DateTime::now())?;

        if record.is_new() {
            if record.get("created_at").is_none() {
                record.set("created_at", bson::DateTime::now())?;
            }

            let stored = self
                .backend
                .insert_one(record.state().clone(), M::collection_name())
                .await?;
            record.replace_state(&stored);
            record.replace_persisted(Some(&stored));
        } else if let Some(patch) = record.update_patch() {
            // The updated_at stamp makes an empty patch unreachable here, but
            // a clean diff is not worth a round-trip if it ever happens.
            let filter = self.identity_filter(record)?;
            let matched = self
                .backend
                .update_many(filter, patch, M::collection_name())
                .await?;

            if matched == 0 {
                return Err(self.no_records_updated());
            }

            self.reload(record).await?;
        }

        for hook in M::save_hooks() {
            hook.after_save(record).await?;
        }

        Ok(())
    }

    /// Re-fetches the record's stored document and resets both snapshots to it.
    ///
    /// A never-saved record has nothing to re-fetch, so reloading it succeeds
    /// immediately without touching the backend.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::Persistence`] when the document no longer exists.
    pub async fn reload(&self, record: &mut Record<M>) -> OdmResult<()> {
        if record.is_new() {
            return Ok(());
        }

        let filter = self.identity_filter(record)?;
        let mut cursor = self
            .backend
            .find_many(filter, M::collection_name())
            .await?;

        match cursor.advance().await? {
            Some(stored) => {
                record.replace_state(&stored);
                record.replace_persisted(Some(&stored));
                Ok(())
            }
            None => Err(OdmError::Persistence(
                M::collection_name().to_string(),
                "record not found during reload".to_string(),
            )),
        }
    }

    /// Deletes the record's stored document, clears the persisted snapshot,
    /// and marks the record destroyed.
    ///
    /// Destroying a never-saved record is a no-op success. The working state
    /// is deliberately left intact so the last-known values remain readable;
    /// any subsequent save of a destroyed record fails.
    pub async fn destroy(&self, record: &mut Record<M>) -> OdmResult<()> {
        if record.is_new() {
            return Ok(());
        }

        let filter = self.identity_filter(record)?;
        self.backend
            .delete_one(filter, M::collection_name())
            .await?;
        record.replace_persisted(None);
        record.mark_destroyed();

        Ok(())
    }

    /// Merges a flat or nested data document into the record and saves.
    ///
    /// The data is flattened to leaf paths and applied one path at a time, so
    /// nested input merges with existing structure instead of replacing it.
    /// Null-valued leaves are skipped, matching payloads where null means
    /// "leave untouched".
    pub async fn update_with(
        &self,
        record: &mut Record<M>,
        data: &Document,
        options: &SaveOptions,
    ) -> OdmResult<()> {
        for (path, value) in flatten(data) {
            if value == Bson::Null {
                continue;
            }
            record.set(&path, value)?;
        }

        self.save(record, options).await
    }

    /// Applies a raw update document to the record's stored document,
    /// bypassing diff synthesis, cleaning, and timestamping entirely.
    ///
    /// Operator keys (`$`-prefixed) pass through verbatim; plain keys fold
    /// into a `$set`. The record is reloaded afterwards so its snapshots pick
    /// up whatever the operators produced.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::Persistence`] when no stored document matched.
    pub async fn direct_update_with(
        &self,
        record: &mut Record<M>,
        update: &Document,
    ) -> OdmResult<()> {
        let mut patch = Document::new();
        let mut set = Document::new();

        for (key, value) in update {
            if key.starts_with('$') {
                patch.insert(key.clone(), value.clone());
            } else {
                set.insert(key.clone(), value.clone());
            }
        }
        if !set.is_empty() {
            patch.insert("$set", set);
        }

        let filter = self.identity_filter(record)?;
        let matched = self
            .backend
            .update_many(filter, patch, M::collection_name())
            .await?;

        if matched == 0 {
            return Err(self.no_records_updated());
        }

        self.reload(record).await
    }

    /// Fetches the single record matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::MultipleResults`] when more than one document
    /// matches; `Ok(None)` when none does.
    pub async fn get(&self, filter: Document) -> OdmResult<Option<Record<M>>> {
        // Two is enough to prove non-uniqueness.
        let mut cursor = self.find(filter).await?.limit(2);

        let Some(record) = cursor.next().await? else {
            return Ok(None);
        };

        if cursor.next().await?.is_some() {
            return Err(OdmError::MultipleResults(
                M::collection_name().to_string(),
                "query matched more than one record".to_string(),
            ));
        }

        Ok(Some(record))
    }

    /// Fetches the single record with the given identifier.
    pub async fn get_by_id(&self, id: &Bson) -> OdmResult<Option<Record<M>>> {
        let oid = coerce_object_id(id)?;
        self.get(doc! { "_id": oid }).await
    }

    /// Starts a filtered query, returning a configurable cursor.
    pub async fn find(&self, filter: Document) -> OdmResult<RecordCursor<M>> {
        let inner = self
            .backend
            .find_many(filter, M::collection_name())
            .await?;

        Ok(RecordCursor::new(inner))
    }

    /// A cursor over every record in the collection.
    pub async fn all(&self) -> OdmResult<RecordCursor<M>> {
        self.find(Document::new()).await
    }

    /// Fetches the single matching record, or initializes an unsaved one
    /// seeded from the filter's plain equality fields.
    pub async fn get_or_initialize(&self, filter: Document) -> OdmResult<Record<M>> {
        match self.get(filter.clone()).await? {
            Some(record) => Ok(record),
            None => Ok(Record::with_data(&plain_fields(&filter))),
        }
    }

    /// Creates and saves a record seeded with `data`.
    pub async fn create(&self, data: &Document, options: &SaveOptions) -> OdmResult<Record<M>> {
        let mut record = Record::with_data(data);
        self.save(&mut record, options).await?;

        Ok(record)
    }

    /// Fetches the single matching record, or creates one from the filter's
    /// plain equality fields.
    pub async fn get_or_create(
        &self,
        filter: Document,
        options: &SaveOptions,
    ) -> OdmResult<Record<M>> {
        match self.get(filter.clone()).await? {
            Some(record) => Ok(record),
            None => self.create(&plain_fields(&filter), options).await,
        }
    }

    fn identity_filter(&self, record: &Record<M>) -> OdmResult<Document> {
        let id = record.id().ok_or_else(|| {
            OdmError::Identifier(format!(
                "record of model '{}' has no identifier",
                M::collection_name()
            ))
        })?;

        Ok(doc! { "_id": coerce_object_id(id)? })
    }

    fn no_records_updated(&self) -> OdmError {
        OdmError::Persistence(
            M::collection_name().to_string(),
            "no records updated".to_string(),
        )
    }
}

/// Extracts the plain equality fields of a filter, dropping operator
/// expressions. Used to seed records from the filter that failed to find them.
fn plain_fields(filter: &Document) -> Document {
    filter
        .iter()
        .filter(|(key, value)| {
            !key.starts_with('$')
                && !matches!(value, Bson::Document(doc) if doc.keys().any(|k| k.starts_with('$')))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

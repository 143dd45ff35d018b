//! The addressable, mutable entity instance.
//!
//! A [`Record`] owns the dual working/persisted state for one document and is
//! mutated exclusively through dot-delimited path accessors. It knows how to
//! diff itself, report its dirty fields, and roll back writes that fall
//! outside an access context — but it never talks to storage; that is the
//! repository's job.

use std::marker::PhantomData;

use bson::{Array, Bson, Document, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    change::{self, Change},
    context::AccessKind,
    error::{OdmError, OdmResult},
    model::Model,
    path::{PathSlot, any_covers, any_nested_in, deep_fetch, flatten, path_slot, remove_path, set_path},
    state::DualState,
};

/// An in-memory document of type `M` with working/persisted dual state.
///
/// A record with no persisted snapshot has never been saved (`is_new`). After
/// a destroy, the persisted snapshot is cleared but the working state is
/// deliberately kept so callers can still display the last-known values.
pub struct Record<M: Model> {
    state: DualState,
    destroyed: bool,
    _marker: PhantomData<M>,
}

// Manual impls: model types are markers and need not be Clone or Debug.
impl<M: Model> Clone for Record<M> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            destroyed: self.destroyed,
            _marker: PhantomData,
        }
    }
}

impl<M: Model> std::fmt::Debug for Record<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("model", &M::collection_name())
            .field("state", &self.state)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl<M: Model> Record<M> {
    /// Creates an empty, never-saved record.
    pub fn new() -> Self {
        Self {
            state: DualState::new(),
            destroyed: false,
            _marker: PhantomData,
        }
    }

    /// Creates a never-saved record seeded with initial working data.
    pub fn with_data(data: &Document) -> Self {
        let mut record = Self::new();
        record.state.set_state(data);
        record
    }

    /// Hydrates a record from a raw stored document: both snapshots are set
    /// to revived copies of it.
    pub fn hydrate(raw: &Document) -> Self {
        let mut record = Self::new();
        record.state.set_state(raw);
        record.state.set_persisted(Some(raw));
        record
    }

    /// The current working snapshot.
    pub fn state(&self) -> &Document {
        self.state.state()
    }

    /// The last snapshot known to match storage.
    pub fn persisted_state(&self) -> Option<&Document> {
        self.state.persisted()
    }

    pub(crate) fn replace_state(&mut self, doc: &Document) {
        self.state.set_state(doc);
    }

    pub(crate) fn replace_persisted(&mut self, doc: Option<&Document>) {
        self.state.set_persisted(doc);
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    /// True before the first successful save.
    pub fn is_new(&self) -> bool {
        self.state.persisted().is_none()
    }

    /// True once the record's stored document has been deleted.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// The record's identifier, if one has been assigned.
    pub fn id(&self) -> Option<&Bson> {
        self.state.state().get("_id")
    }

    /// Reads the value at a path; `None` when any segment is missing.
    pub fn get(&self, path: &str) -> Option<&Bson> {
        deep_fetch(self.state.state(), path)
    }

    /// Reads the value at a path, falling back to a default when missing.
    pub fn get_or<'a>(&'a self, path: &str, default: &'a Bson) -> &'a Bson {
        self.get(path).unwrap_or(default)
    }

    /// Writes a value at a path, materializing missing intermediates.
    pub fn set(&mut self, path: &str, value: impl Into<Bson>) -> OdmResult<()> {
        set_path(self.state.state_mut(), path, value.into())
    }

    /// Removes the value at a path. Missing paths are a no-op.
    pub fn unset(&mut self, path: &str) -> OdmResult<()> {
        remove_path(self.state.state_mut(), path)
    }

    /// Appends a value to the array at `path`, creating the array when the
    /// path is absent.
    pub fn push(&mut self, path: &str, value: impl Into<Bson>) -> OdmResult<()> {
        self.array_at(path)?.push(value.into());
        Ok(())
    }

    /// Prepends a value to the array at `path`, creating the array when the
    /// path is absent.
    pub fn unshift(&mut self, path: &str, value: impl Into<Bson>) -> OdmResult<()> {
        self.array_at(path)?.insert(0, value.into());
        Ok(())
    }

    /// Removes `delete_count` elements at `start` from the array at `path`,
    /// inserting `items` in their place, and returns the removed elements.
    /// Out-of-range bounds are clamped.
    pub fn splice(
        &mut self,
        path: &str,
        start: usize,
        delete_count: usize,
        items: Vec<Bson>,
    ) -> OdmResult<Vec<Bson>> {
        let arr = self.array_at(path)?;
        let start = start.min(arr.len());
        let end = (start + delete_count).min(arr.len());

        Ok(arr.splice(start..end, items).collect())
    }

    fn array_at(&mut self, path: &str) -> OdmResult<&mut Array> {
        let not_an_array =
            || OdmError::Attribute(format!("'{path}' does not address an array value"));

        match path_slot(self.state.state_mut(), path, true)? {
            Some(PathSlot::Entry(doc, key)) => {
                if !doc.contains_key(&key) {
                    doc.insert(key.clone(), Bson::Array(Vec::new()));
                }
                match doc.get_mut(&key) {
                    Some(Bson::Array(arr)) => Ok(arr),
                    _ => Err(not_an_array()),
                }
            }
            Some(PathSlot::Index(arr, index)) => match arr.get_mut(index) {
                Some(Bson::Array(inner)) => Ok(inner),
                _ => Err(not_an_array()),
            },
            None => Err(not_an_array()),
        }
    }

    /// Computes the change set between the persisted and working snapshots.
    pub fn changes(&self) -> Vec<Change> {
        change::compute_change_set(self.state.persisted(), self.state.state())
    }

    /// The flat list of dirty leaf paths.
    pub fn dirty_fields(&self) -> Vec<String> {
        change::dirty_fields(&self.changes())
    }

    /// The minimal update patch for the current changes, or `None` when the
    /// record is clean.
    pub fn update_patch(&self) -> Option<Document> {
        change::build_update_patch(&self.changes(), self.state.state())
    }

    /// Rolls back every dirty path that is not writable under `context`.
    ///
    /// For each disallowed path the rollback point is its shortest prefix
    /// that no longer leads toward any allowed entry; that slot is restored
    /// to its persisted value, or removed entirely when it had none. Running
    /// `clean` twice produces no further changes.
    pub fn clean(&mut self, context: Option<&str>) -> OdmResult<()> {
        let Some(allowed) = M::contexts().allowed(context, AccessKind::Writable) else {
            return Ok(());
        };
        let allowed = allowed.clone();

        for path in self.dirty_fields() {
            if any_covers(&allowed, &path) {
                continue;
            }

            let divergence = divergence_point(&path, &allowed);
            let persisted_value = self
                .state
                .persisted()
                .and_then(|p| deep_fetch(p, &divergence))
                .cloned();

            match persisted_value {
                Some(value) => set_path(self.state.state_mut(), &divergence, value)?,
                None => remove_path(self.state.state_mut(), &divergence)?,
            }
        }

        Ok(())
    }

    /// Deserializes the working state into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::Serialization`] when the working state does not
    /// match the target shape.
    pub fn parse<T: DeserializeOwned>(&self) -> OdmResult<T> {
        Ok(deserialize_from_bson(Bson::Document(
            self.state.state().clone(),
        ))?)
    }

    /// Builds an unsaved record from any serializable value with a
    /// document-shaped serialization.
    pub fn from_serializable<T: Serialize>(value: &T) -> OdmResult<Self> {
        match serialize_to_bson(value)? {
            Bson::Document(doc) => Ok(Self::with_data(&doc)),
            other => Err(OdmError::Serialization(format!(
                "expected a document-shaped value, got {other:?}"
            ))),
        }
    }

    /// Renders the working state as plain JSON: identifiers as 24-hex strings
    /// and timestamps as RFC3339 strings, the inverse of the revival applied
    /// on the way in.
    pub fn to_json(&self) -> OdmResult<Value> {
        json_value(&Bson::Document(self.state.state().clone()))
    }

    /// Projects the working state down to the paths readable under `context`.
    pub fn readable_document(&self, context: Option<&str>) -> OdmResult<Document> {
        let Some(allowed) = M::contexts().allowed(context, AccessKind::Readable) else {
            return Ok(self.state.state().clone());
        };

        let mut out = Document::new();
        for (path, value) in flatten(self.state.state()) {
            if any_covers(allowed, &path) {
                set_path(&mut out, &path, value)?;
            }
        }

        Ok(out)
    }
}

impl<M: Model> Default for Record<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// The shortest prefix of `path` that neither is covered by nor leads toward
/// any allowed entry — the slot `clean` rolls back.
fn divergence_point(path: &str, allowed: &std::collections::BTreeSet<String>) -> String {
    let mut prefix = String::new();
    for segment in path.split('.') {
        if prefix.is_empty() {
            prefix.push_str(segment);
        } else {
            prefix.push('.');
            prefix.push_str(segment);
        }

        if !any_nested_in(&prefix, allowed) {
            return prefix;
        }
    }

    path.to_string()
}

fn json_value(value: &Bson) -> OdmResult<Value> {
    Ok(match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(
            dt.try_to_rfc3339_string()
                .map_err(|e| OdmError::Serialization(e.to_string()))?,
        ),
        Bson::Array(arr) => Value::Array(
            arr.iter()
                .map(json_value)
                .collect::<OdmResult<_>>()?,
        ),
        Bson::Document(doc) => Value::Object(
            doc.iter()
                .map(|(key, value)| Ok((key.clone(), json_value(value)?)))
                .collect::<OdmResult<_>>()?,
        ),
        scalar => serde_json::to_value(scalar)?,
    })
}

/// Coerces a caller-supplied value to the storage-native identifier type.
///
/// # Errors
///
/// Returns [`OdmError::Identifier`] when the value is neither an identifier
/// nor a 24-hex string.
pub fn coerce_object_id(value: &Bson) -> OdmResult<ObjectId> {
    match value {
        Bson::ObjectId(oid) => Ok(*oid),
        Bson::String(s) => ObjectId::parse_str(s).map_err(|_| {
            OdmError::Identifier(format!("'{s}' cannot be coerced to an object identifier"))
        }),
        other => Err(OdmError::Identifier(format!(
            "{other:?} cannot be coerced to an object identifier"
        ))),
    }
}

//! Dual-snapshot state storage for entity records.
//!
//! Every record holds two snapshots: the current working state, mutated only
//! through path-addressed accessors, and the last state known to match storage.
//! A record with no persisted snapshot is by definition new.
//!
//! Setters never alias caller-supplied documents: input is deep-copied through
//! [`revive_document`], which also restores two lexical patterns to their
//! native BSON types — a 24-hex-digit string becomes an [`ObjectId`], and an
//! RFC3339 timestamp string becomes a [`bson::DateTime`]. This revival is
//! load-bearing: identifiers and timestamps arriving as plain strings (from
//! JSON payloads, for example) must survive as their native types so diffs and
//! identifier filters compare like with like.

use bson::{Bson, Document, oid::ObjectId};

/// The two snapshots a record carries.
///
/// `persisted` is never touched by ordinary field setters; only the
/// persistence orchestrator replaces it, wholesale, after a storage
/// round-trip succeeds.
#[derive(Debug, Clone, Default)]
pub struct DualState {
    working: Document,
    persisted: Option<Document>,
}

impl DualState {
    /// Creates an empty, never-persisted state pair.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current working snapshot.
    pub fn state(&self) -> &Document {
        &self.working
    }

    pub(crate) fn state_mut(&mut self) -> &mut Document {
        &mut self.working
    }

    /// Replaces the working snapshot with a revived deep copy of `doc`.
    pub fn set_state(&mut self, doc: &Document) {
        self.working = revive_document(doc);
    }

    /// The last snapshot known to match storage, if the record was ever saved.
    pub fn persisted(&self) -> Option<&Document> {
        self.persisted.as_ref()
    }

    /// Replaces (or clears) the persisted snapshot with a revived deep copy.
    pub fn set_persisted(&mut self, doc: Option<&Document>) {
        self.persisted = doc.map(revive_document);
    }
}

/// Deep-copies a document, restoring identifier and timestamp strings to
/// their native BSON types along the way.
pub fn revive_document(doc: &Document) -> Document {
    doc.iter()
        .map(|(key, value)| (key.clone(), revive_value(value)))
        .collect()
}

/// Recursively revives one BSON value. Strings matching the canonical
/// 24-hex identifier pattern become [`ObjectId`]s; strings parsing as
/// RFC3339 timestamps become [`bson::DateTime`]s; everything else is a
/// plain deep copy.
pub fn revive_value(value: &Bson) -> Bson {
    match value {
        Bson::String(s) => revive_string(s),
        Bson::Array(arr) => Bson::Array(arr.iter().map(revive_value).collect()),
        Bson::Document(doc) => Bson::Document(revive_document(doc)),
        other => other.clone(),
    }
}

fn revive_string(s: &str) -> Bson {
    if s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        if let Ok(oid) = ObjectId::parse_str(s) {
            return Bson::ObjectId(oid);
        }
    }

    if let Ok(timestamp) = chrono::DateTime::parse_from_rfc3339(s) {
        return Bson::DateTime(bson::DateTime::from_chrono(timestamp));
    }

    Bson::String(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn setters_copy_rather_than_alias() {
        let outside = doc! { "name": "nina" };
        let mut state = DualState::new();
        state.set_state(&outside);

        // The caller's document is untouched and detached from the record's copy.
        assert_eq!(outside, doc! { "name": "nina" });
        assert_eq!(state.state(), &doc! { "name": "nina" });
    }

    #[test]
    fn identifier_strings_revive_to_object_ids() {
        let oid = ObjectId::new();
        let mut state = DualState::new();
        state.set_state(&doc! { "_id": oid.to_hex(), "ref": { "owner": oid.to_hex() } });

        assert_eq!(state.state().get("_id"), Some(&Bson::ObjectId(oid)));
        assert_eq!(
            deep(state.state(), "ref.owner"),
            Some(&Bson::ObjectId(oid))
        );
    }

    #[test]
    fn timestamp_strings_revive_to_datetimes() {
        let mut state = DualState::new();
        state.set_state(&doc! { "created_at": "2024-03-01T12:30:00Z" });

        assert!(matches!(
            state.state().get("created_at"),
            Some(Bson::DateTime(_))
        ));
    }

    #[test]
    fn ordinary_strings_survive_unchanged() {
        let mut state = DualState::new();
        state.set_state(&doc! { "name": "march 2024", "code": "abc123" });

        assert_eq!(state.state().get("name"), Some(&Bson::String("march 2024".into())));
        assert_eq!(state.state().get("code"), Some(&Bson::String("abc123".into())));
    }

    #[test]
    fn revival_recurses_through_arrays() {
        let oid = ObjectId::new();
        let revived = revive_value(&Bson::Array(vec![Bson::String(oid.to_hex())]));

        assert_eq!(revived, Bson::Array(vec![Bson::ObjectId(oid)]));
    }

    fn deep<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
        crate::path::deep_fetch(doc, path)
    }
}

//! Structural diffing between the persisted and working snapshots, and
//! synthesis of minimal partial-update patches from the result.
//!
//! The engine produces three views of "what changed":
//!
//! - [`compute_change_set`] - the raw ordered change records
//! - [`dirty_fields`] - a flat list of the most specific dirty leaf paths
//! - [`build_update_patch`] - a `$set`/`$unset` patch document ready for the
//!   storage collaborator
//!
//! Arrays get special treatment throughout. Element edits that keep the
//! length patch by index, but any length change is flagged distinctly and
//! collapses to whole-array replacement: there is no atomic "remove by
//! index" in the storage layer, so shrinking an array in place would race
//! against its own index shifts. Replacing the array wholesale is the
//! uniform safe fallback.

use bson::{Bson, Document};

use crate::path::{covers, deep_fetch, flatten};

/// One key step inside a structural path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKey {
    /// A document key.
    Field(String),
    /// An array index.
    Index(usize),
}

impl std::fmt::Display for PathKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathKey::Field(name) => write!(f, "{name}"),
            PathKey::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A single diff unit between two snapshots. Produced transiently per diff
/// computation and never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A field present in the working state but not the persisted state.
    Added { path: Vec<PathKey>, new: Bson },
    /// A field present in both states with differing values.
    Edited { path: Vec<PathKey>, old: Bson, new: Bson },
    /// A field present in the persisted state but removed from the working state.
    Removed { path: Vec<PathKey>, old: Bson },
    /// An array whose length changed; `path` addresses the array itself.
    ArrayResized { path: Vec<PathKey>, from: usize, to: usize },
}

impl Change {
    /// The structural path this change applies to.
    pub fn path(&self) -> &[PathKey] {
        match self {
            Change::Added { path, .. }
            | Change::Edited { path, .. }
            | Change::Removed { path, .. }
            | Change::ArrayResized { path, .. } => path,
        }
    }

    /// The path rendered as a dot-delimited string.
    pub fn dotted_path(&self) -> String {
        self.path()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Computes the ordered change set between the persisted snapshot (an empty
/// document for never-saved records) and the working snapshot.
pub fn compute_change_set(persisted: Option<&Document>, working: &Document) -> Vec<Change> {
    let empty = Document::new();
    let mut changes = Vec::new();
    diff_documents(persisted.unwrap_or(&empty), working, &mut Vec::new(), &mut changes);
    changes
}

fn diff_documents(old: &Document, new: &Document, path: &mut Vec<PathKey>, out: &mut Vec<Change>) {
    for (key, old_value) in old {
        path.push(PathKey::Field(key.clone()));
        match new.get(key) {
            Some(new_value) => diff_values(old_value, new_value, path, out),
            None => out.push(Change::Removed { path: path.clone(), old: old_value.clone() }),
        }
        path.pop();
    }

    for (key, new_value) in new {
        if !old.contains_key(key) {
            path.push(PathKey::Field(key.clone()));
            out.push(Change::Added { path: path.clone(), new: new_value.clone() });
            path.pop();
        }
    }
}

fn diff_values(old: &Bson, new: &Bson, path: &mut Vec<PathKey>, out: &mut Vec<Change>) {
    match (old, new) {
        (Bson::Document(old_doc), Bson::Document(new_doc)) => {
            diff_documents(old_doc, new_doc, path, out);
        }
        (Bson::Array(old_arr), Bson::Array(new_arr)) => {
            let common = old_arr.len().min(new_arr.len());
            for index in 0..common {
                path.push(PathKey::Index(index));
                diff_values(&old_arr[index], &new_arr[index], path, out);
                path.pop();
            }

            for (index, value) in new_arr.iter().enumerate().skip(common) {
                path.push(PathKey::Index(index));
                out.push(Change::Added { path: path.clone(), new: value.clone() });
                path.pop();
            }
            for (index, value) in old_arr.iter().enumerate().skip(common) {
                path.push(PathKey::Index(index));
                out.push(Change::Removed { path: path.clone(), old: value.clone() });
                path.pop();
            }

            if old_arr.len() != new_arr.len() {
                out.push(Change::ArrayResized {
                    path: path.clone(),
                    from: old_arr.len(),
                    to: new_arr.len(),
                });
            }
        }
        _ if old != new => {
            out.push(Change::Edited {
                path: path.clone(),
                old: old.clone(),
                new: new.clone(),
            });
        }
        _ => {}
    }
}

/// Derives the flat list of dirty leaf paths from a change set.
///
/// Object-valued right-hand sides flatten to their full leaf paths (both
/// sides, union); strict ancestor-prefixes of more specific paths are
/// dropped, except that resized arrays collapse the other way: the array's
/// base path survives and its per-index paths are discarded, reflecting the
/// whole-array replacement the patch builder will emit.
pub fn dirty_fields(changes: &[Change]) -> Vec<String> {
    let mut paths = std::collections::BTreeSet::new();
    let mut resized = Vec::new();

    for change in changes {
        let base = change.dotted_path();
        match change {
            Change::Added { new, .. } => {
                flatten_side(&base, new, &mut paths);
            }
            Change::Edited { old, new, .. } => {
                flatten_side(&base, new, &mut paths);
                if matches!(old, Bson::Document(doc) if !doc.is_empty()) {
                    flatten_side(&base, old, &mut paths);
                }
            }
            Change::Removed { .. } => {
                paths.insert(base);
            }
            Change::ArrayResized { .. } => {
                resized.push(base);
            }
        }
    }

    for base in &resized {
        paths.retain(|p| !(covers(base, p) && p != base));
        paths.insert(base.clone());
    }

    paths
        .iter()
        .filter(|path| {
            let path = path.as_str();
            resized.iter().any(|r| r == path)
                || !paths
                    .iter()
                    .any(|other| other != path && covers(path, other))
        })
        .cloned()
        .collect()
}

fn flatten_side(base: &str, value: &Bson, out: &mut std::collections::BTreeSet<String>) {
    match value {
        Bson::Document(doc) if !doc.is_empty() => {
            for (leaf, _) in flatten(doc) {
                out.insert(format!("{base}.{leaf}"));
            }
        }
        _ => {
            out.insert(base.to_string());
        }
    }
}

/// Translates a change set into a minimal partial-update patch, or `None`
/// when there is nothing to write.
///
/// New and edited paths land in `$set`, removed paths in `$unset`. A final
/// pass handles resized arrays: any `$set`/`$unset` entry nested under a
/// resized array path is superseded and purged, and the array path is set
/// wholesale to its full current value from the working snapshot.
pub fn build_update_patch(changes: &[Change], working: &Document) -> Option<Document> {
    let mut set = Document::new();
    let mut unset = Document::new();
    let mut resized = Vec::new();

    for change in changes {
        let path = change.dotted_path();
        match change {
            Change::Added { new, .. } | Change::Edited { new, .. } => {
                set.insert(path, new.clone());
            }
            Change::Removed { .. } => {
                unset.insert(path, "");
            }
            Change::ArrayResized { .. } => {
                resized.push(path);
            }
        }
    }

    for base in &resized {
        set = set
            .into_iter()
            .filter(|(key, _)| !(covers(base, key) && key != base))
            .collect();
        unset = unset
            .into_iter()
            .filter(|(key, _)| !(covers(base, key) && key != base))
            .collect();

        set.insert(
            base.clone(),
            deep_fetch(working, base)
                .cloned()
                .unwrap_or(Bson::Array(Vec::new())),
        );
    }

    if set.is_empty() && unset.is_empty() {
        return None;
    }

    let mut patch = Document::new();
    if !set.is_empty() {
        patch.insert("$set", set);
    }
    if !unset.is_empty() {
        patch.insert("$unset", unset);
    }

    Some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, doc};

    fn changes(old: &Document, new: &Document) -> Vec<Change> {
        compute_change_set(Some(old), new)
    }

    #[test]
    fn fresh_record_marks_each_leaf_dirty() {
        let working = doc! { "a": { "b": 1, "c": 2 } };
        let set = compute_change_set(None, &working);

        assert_eq!(dirty_fields(&set), vec!["a.b", "a.c"]);
    }

    #[test]
    fn sibling_edits_stay_separate_paths() {
        let old = doc! { "a": { "b": 1, "c": 2 } };
        let new = doc! { "a": { "b": 9, "c": 8 } };

        assert_eq!(dirty_fields(&changes(&old, &new)), vec!["a.b", "a.c"]);
    }

    #[test]
    fn array_shrink_collapses_to_base_path() {
        let old = doc! { "tags": [1, 2, 3, 4, 5] };
        let new = doc! { "tags": [1, 2, 3] };

        assert_eq!(dirty_fields(&changes(&old, &new)), vec!["tags"]);
    }

    #[test]
    fn length_preserving_element_edit_patches_by_index() {
        let old = doc! { "tags": ["a", "b", "c"] };
        let new = doc! { "tags": ["a", "x", "c"] };

        let patch = build_update_patch(&changes(&old, &new), &new).unwrap();
        assert_eq!(patch, doc! { "$set": { "tags.1": "x" } });
    }

    #[test]
    fn array_growth_replaces_wholesale() {
        let old = doc! { "tags": ["a"] };
        let new = doc! { "tags": ["a", "b"] };

        let patch = build_update_patch(&changes(&old, &new), &new).unwrap();
        assert_eq!(patch, doc! { "$set": { "tags": ["a", "b"] } });
    }

    #[test]
    fn shrink_purges_superseded_index_entries() {
        let old = doc! { "tags": ["a", "b", "c"] };
        let new = doc! { "tags": ["z"] };

        let patch = build_update_patch(&changes(&old, &new), &new).unwrap();
        // The index edit at 0 and removals at 1..3 are all superseded.
        assert_eq!(patch, doc! { "$set": { "tags": ["z"] } });
    }

    #[test]
    fn removed_fields_land_in_unset() {
        let old = doc! { "keep": 1, "drop": 2 };
        let new = doc! { "keep": 1 };

        let patch = build_update_patch(&changes(&old, &new), &new).unwrap();
        assert_eq!(patch, doc! { "$unset": { "drop": "" } });
    }

    #[test]
    fn unchanged_snapshots_produce_no_patch() {
        let same = doc! { "a": 1, "b": { "c": [1, 2] } };

        assert!(changes(&same, &same).is_empty());
        assert_eq!(build_update_patch(&[], &same), None);
    }

    #[test]
    fn nested_document_edit_flattens_both_sides() {
        let old = doc! { "meta": { "x": 1 } };
        let new = doc! { "meta": { "y": 2 } };

        assert_eq!(dirty_fields(&changes(&old, &new)), vec!["meta.x", "meta.y"]);
    }

    #[test]
    fn scalar_replaced_by_document_emits_new_leaves() {
        let old = doc! { "meta": 1 };
        let new = doc! { "meta": { "x": 1, "y": 2 } };

        assert_eq!(dirty_fields(&changes(&old, &new)), vec!["meta.x", "meta.y"]);
        let patch = build_update_patch(&changes(&old, &new), &new).unwrap();
        assert_eq!(patch, doc! { "$set": { "meta": { "x": 1, "y": 2 } } });
    }

    #[test]
    fn dotted_paths_include_array_indices() {
        let old = doc! { "rows": [{ "n": 1 }] };
        let new = doc! { "rows": [{ "n": 2 }] };

        let set = changes(&old, &new);
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].dotted_path(), "rows.0.n");
        assert_eq!(
            set[0],
            Change::Edited {
                path: vec![
                    PathKey::Field("rows".into()),
                    PathKey::Index(0),
                    PathKey::Field("n".into()),
                ],
                old: bson!(1),
                new: bson!(2),
            }
        );
    }
}

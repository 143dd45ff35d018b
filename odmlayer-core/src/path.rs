//! Dot-delimited path addressing for nested BSON documents.
//!
//! This module is the foundation every other subsystem builds on: it resolves
//! paths like `"profile.address.city"` or `"tags.2"` into the container that
//! owns the terminal slot, so callers can read, write, or delete exactly one
//! nested value. Numeric segments address array indices the same way string
//! segments address document keys.
//!
//! Reads never fail on missing paths: [`deep_fetch`] short-circuits to `None`
//! the moment any intermediate segment is absent. Note that addressing cannot
//! distinguish "path absent" from "path present holding null" — both read back
//! as missing from the caller's perspective. This is a deliberate
//! simplification, not a bug.

use bson::{Array, Bson, Document};

use crate::error::{OdmError, OdmResult};

/// A mutable reference pair for a single terminal slot inside a nested document.
///
/// Produced by [`path_slot`]; the pair identifies the container that owns the
/// final path segment together with the key (or index) inside it.
#[derive(Debug)]
pub enum PathSlot<'a> {
    /// The terminal segment addresses a key inside a document.
    Entry(&'a mut Document, String),
    /// The terminal segment addresses an index inside an array.
    Index(&'a mut Array, usize),
}

fn check_path(path: &str) -> OdmResult<()> {
    if path.is_empty() || path.split('.').any(|segment| segment.is_empty()) {
        return Err(OdmError::Argument(format!(
            "'{path}' is not a well-formed property path"
        )));
    }

    Ok(())
}

/// Reads the value at a dot-delimited path, returning `None` if any segment
/// along the way is missing. Never fails.
pub fn deep_fetch<'a>(root: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = root.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Resolves a path to the mutable container owning its terminal slot.
///
/// Walks all segments but the last; with `create` set, missing intermediate
/// segments are materialized as empty documents. Without it, a missing or
/// non-traversable intermediate resolves to `Ok(None)`.
///
/// # Errors
///
/// Returns [`OdmError::Argument`] if the path is empty or contains an empty
/// segment.
pub fn path_slot<'a>(
    root: &'a mut Document,
    path: &str,
    create: bool,
) -> OdmResult<Option<PathSlot<'a>>> {
    check_path(path)?;

    enum Cursor<'a> {
        Doc(&'a mut Document),
        Arr(&'a mut Array),
    }

    let segments = path.split('.').collect::<Vec<_>>();
    let (last, intermediate) = segments
        .split_last()
        .expect("checked path has at least one segment");

    let mut current = Cursor::Doc(root);
    for segment in intermediate {
        current = match current {
            Cursor::Doc(doc) => {
                if create && !doc.contains_key(*segment) {
                    doc.insert(segment.to_string(), Document::new());
                }
                match doc.get_mut(*segment) {
                    Some(Bson::Document(inner)) => Cursor::Doc(inner),
                    Some(Bson::Array(inner)) => Cursor::Arr(inner),
                    _ => return Ok(None),
                }
            }
            Cursor::Arr(arr) => {
                let Ok(index) = segment.parse::<usize>() else {
                    return Ok(None);
                };
                match arr.get_mut(index) {
                    Some(Bson::Document(inner)) => Cursor::Doc(inner),
                    Some(Bson::Array(inner)) => Cursor::Arr(inner),
                    _ => return Ok(None),
                }
            }
        };
    }

    match current {
        Cursor::Doc(doc) => Ok(Some(PathSlot::Entry(doc, last.to_string()))),
        Cursor::Arr(arr) => match last.parse::<usize>() {
            Ok(index) => Ok(Some(PathSlot::Index(arr, index))),
            Err(_) => Ok(None),
        },
    }
}

/// Writes a value at a path, materializing missing intermediate documents.
///
/// Array indices past the end pad the array with nulls, matching what the
/// storage layer does for positional sets.
pub fn set_path(root: &mut Document, path: &str, value: Bson) -> OdmResult<()> {
    match path_slot(root, path, true)? {
        Some(PathSlot::Entry(doc, key)) => {
            doc.insert(key, value);
            Ok(())
        }
        Some(PathSlot::Index(arr, index)) => {
            while arr.len() < index {
                arr.push(Bson::Null);
            }
            if index < arr.len() {
                arr[index] = value;
            } else {
                arr.push(value);
            }
            Ok(())
        }
        None => Err(OdmError::Argument(format!(
            "cannot address '{path}' through a non-container value"
        ))),
    }
}

/// Removes the value at a path. Document keys are deleted outright; array
/// indices are nulled in place so sibling positions keep their meaning.
/// Missing paths are a no-op.
pub fn remove_path(root: &mut Document, path: &str) -> OdmResult<()> {
    match path_slot(root, path, false)? {
        Some(PathSlot::Entry(doc, key)) => {
            doc.remove(&key);
        }
        Some(PathSlot::Index(arr, index)) => {
            if index < arr.len() {
                arr[index] = Bson::Null;
            }
        }
        None => {}
    }

    Ok(())
}

/// Flattens a document into `(leaf path, value)` pairs.
///
/// Non-empty nested documents descend; arrays and empty documents are treated
/// as leaf values so merges replace them wholesale.
pub fn flatten(doc: &Document) -> Vec<(String, Bson)> {
    let mut leaves = Vec::new();
    flatten_into(doc, String::new(), &mut leaves);
    leaves
}

fn flatten_into(doc: &Document, prefix: String, out: &mut Vec<(String, Bson)>) {
    for (key, value) in doc {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            Bson::Document(inner) if !inner.is_empty() => flatten_into(inner, path, out),
            _ => out.push((path, value.clone())),
        }
    }
}

/// True when `prefix` is an ancestor of `path` or equal to it, segment-wise.
/// `"foo"` covers `"foo.bar"` but not `"foobar"`.
pub fn covers(prefix: &str, path: &str) -> bool {
    path == prefix || (path.len() > prefix.len() && path.starts_with(prefix) && path.as_bytes()[prefix.len()] == b'.')
}

/// True when any entry in `prefixes` covers `path`.
pub fn any_covers<'a>(prefixes: impl IntoIterator<Item = &'a String>, path: &str) -> bool {
    prefixes.into_iter().any(|p| covers(p, path))
}

/// True when any entry in `paths` is nested under (or equal to) `prefix`.
pub fn any_nested_in<'a>(prefix: &str, paths: impl IntoIterator<Item = &'a String>) -> bool {
    paths.into_iter().any(|p| covers(prefix, p))
}

//! Filter evaluation for in-memory document matching.
//!
//! This module evaluates operator-syntax filter documents (`$eq` implied for
//! plain values) against stored BSON documents, enabling filtering and
//! sorting without a query planner.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use odmlayer_core::path::deep_fetch;

/// Type-erased, comparable representation of BSON values.
///
/// This enum wraps BSON values and provides comparison operations for
/// filtering. It normalizes numeric types to f64 for easy comparison.
///
/// # Note
///
/// This is a private implementation detail used for filter evaluation.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// DateTime value
    DateTime(DateTime),
    /// Object identifier
    ObjectId(ObjectId),
    /// String value
    String(&'a str),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr.iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>(),
            ),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>(),
            ),
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Evaluates a filter document against a stored document.
///
/// Every entry of the filter must hold for the document to match. Filter keys
/// are dot-delimited paths; values are either plain (implicit equality) or an
/// operator document over `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
/// and `$exists`. Unknown operators never match.
pub(crate) fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(path, condition)| {
        let field_value = deep_fetch(document, path);

        match condition {
            Bson::Document(ops) if ops.keys().any(|k| k.starts_with('$')) => ops
                .iter()
                .all(|(op, operand)| matches_operator(field_value, op, operand)),
            plain => field_value.is_some_and(|v| Comparable::from(v) == Comparable::from(plain)),
        }
    })
}

fn matches_operator(field_value: Option<&Bson>, op: &str, operand: &Bson) -> bool {
    if op == "$exists" {
        let should_exist = matches!(operand, Bson::Boolean(true));
        return field_value.is_some() == should_exist;
    }

    let Some(field_value) = field_value else {
        // Absent fields satisfy only $ne, mirroring the remote backend.
        return op == "$ne";
    };

    let left = Comparable::from(field_value);

    match op {
        "$eq" => left == Comparable::from(operand),
        "$ne" => left != Comparable::from(operand),
        "$gt" | "$gte" | "$lt" | "$lte" => {
            match left.partial_cmp(&Comparable::from(operand)) {
                Some(ordering) => match op {
                    "$gt" => ordering == Ordering::Greater,
                    "$gte" => ordering == Ordering::Greater || ordering == Ordering::Equal,
                    "$lt" => ordering == Ordering::Less,
                    "$lte" => ordering == Ordering::Less || ordering == Ordering::Equal,
                    _ => unreachable!(),
                },
                None => false,
            }
        }
        "$in" => match operand {
            Bson::Array(candidates) => candidates
                .iter()
                .any(|candidate| left == Comparable::from(candidate)),
            _ => false,
        },
        _ => false,
    }
}

/// Compares two documents on a field path for sorting; unordered pairs sort
/// as equal so the overall ordering stays stable.
pub(crate) fn compare_on(a: &Document, b: &Document, path: &str) -> Ordering {
    match (deep_fetch(a, path), deep_fetch(b, path)) {
        (Some(left), Some(right)) => Comparable::from(left)
            .partial_cmp(&Comparable::from(right))
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn plain_values_match_by_equality() {
        let document = doc! { "name": "nina", "age": 33 };

        assert!(matches(&document, &doc! { "name": "nina" }));
        assert!(matches(&document, &doc! { "age": 33.0 }));
        assert!(!matches(&document, &doc! { "name": "otto" }));
    }

    #[test]
    fn identifier_equality_compares_object_ids() {
        let oid = ObjectId::new();
        let document = doc! { "_id": oid };

        assert!(matches(&document, &doc! { "_id": oid }));
        assert!(!matches(&document, &doc! { "_id": ObjectId::new() }));
    }

    #[test]
    fn dotted_filter_paths_reach_nested_fields() {
        let document = doc! { "profile": { "age": 40 } };

        assert!(matches(&document, &doc! { "profile.age": { "$gte": 40 } }));
        assert!(!matches(&document, &doc! { "profile.age": { "$gt": 40 } }));
    }

    #[test]
    fn comparison_operators_normalize_numeric_types() {
        let document = doc! { "n": 5_i64 };

        assert!(matches(&document, &doc! { "n": { "$gt": 4.5 } }));
        assert!(matches(&document, &doc! { "n": { "$lte": 5_i32 } }));
    }

    #[test]
    fn in_operator_scans_candidates() {
        let document = doc! { "state": "open" };

        assert!(matches(&document, &doc! { "state": { "$in": ["open", "held"] } }));
        assert!(!matches(&document, &doc! { "state": { "$in": ["done"] } }));
    }

    #[test]
    fn exists_checks_presence_not_value() {
        let document = doc! { "nullable": Bson::Null };

        assert!(matches(&document, &doc! { "nullable": { "$exists": true } }));
        assert!(matches(&document, &doc! { "missing": { "$exists": false } }));
        assert!(!matches(&document, &doc! { "missing": { "$exists": true } }));
    }

    #[test]
    fn ne_matches_absent_fields() {
        let document = doc! { "a": 1 };

        assert!(matches(&document, &doc! { "missing": { "$ne": 1 } }));
        assert!(!matches(&document, &doc! { "a": { "$ne": 1 } }));
    }

    #[test]
    fn mismatched_types_never_order() {
        let document = doc! { "n": "five" };

        assert!(!matches(&document, &doc! { "n": { "$gt": 4 } }));
        assert!(!matches(&document, &doc! { "n": { "$lt": 4 } }));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&doc! { "x": 1 }, &doc! {}));
    }
}

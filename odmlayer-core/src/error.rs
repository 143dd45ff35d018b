//! Error types and result types for mapping-layer operations.
//!
//! This module provides error handling for every fallible operation in the crate.
//! Use [`OdmResult<T>`] as the return type for fallible operations.
//!
//! Model-scoped variants carry the collection name of the model they originate
//! from, and their `Display` output follows a `(model).(kind)Error` discriminator
//! so callers can match failures to entity types from log output alone.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur in the mapping layer.
///
/// Covers synchronous argument/attribute failures, the persistence lifecycle,
/// and backend-specific errors.
#[derive(Error, Debug)]
pub enum OdmError {
    /// The model's validation step reported failing fields.
    /// No storage I/O was attempted. The second argument is the failing field list.
    #[error("{0}.ValidationError: validation failed for fields: {1:?}")]
    Validation(String, Vec<String>),
    /// An insert returned no document, an update matched zero rows,
    /// or a delete failed at the storage layer.
    #[error("{0}.PersistenceError: {1}")]
    Persistence(String, String),
    /// A single-result finder matched more than one document.
    #[error("{0}.ResultError: {1}")]
    MultipleResults(String, String),
    /// An array-only mutator (push/unshift/splice) was invoked against a non-array slot.
    #[error("AttributeError: {0}")]
    Attribute(String),
    /// A path-based accessor was invoked without a well-formed path string.
    #[error("ArgumentError: {0}")]
    Argument(String),
    /// A supplied identifier could not be coerced to the storage-native identifier type.
    #[error("IdentifierError: {0}")]
    Identifier(String),
    /// Serialization/deserialization error when converting document values.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for mapping-layer operations.
pub type OdmResult<T> = Result<T, OdmError>;

impl From<BsonError> for OdmError {
    fn from(err: BsonError) -> Self {
        OdmError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for OdmError {
    fn from(err: SerdeJsonError) -> Self {
        OdmError::Serialization(err.to_string())
    }
}

//! Convenient re-exports of commonly used types from odmlayer.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use odmlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The model trait and its capability/hook surface
//! - Records, cursors, and the repository API
//! - Access-context declarations
//! - Store backends and builders
//! - Error types

pub use odmlayer_core::{
    backend::{BackendCursor, CursorConfig, StoreBackend, StoreBackendBuilder},
    change::{Change, PathKey},
    context::{ALL_CONTEXT, AccessContexts, AccessKind, DEFAULT_CONTEXT},
    cursor::RecordCursor,
    error::{OdmError, OdmResult},
    model::{CapabilityFn, CapabilityRegistry, HookFuture, Model, SaveHook},
    record::Record,
    repository::{ModelStore, Repository, SaveOptions},
};

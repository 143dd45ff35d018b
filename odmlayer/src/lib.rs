//! Main odmlayer crate providing an object-document mapping layer over
//! schemaless document stores.
//!
//! This crate is the primary entry point for users of the odmlayer framework.
//! It re-exports the core types and functionality from various sub-crates and
//! provides convenient access to different storage backends.
//!
//! # Features
//!
//! - **Path-addressed records** - Read and write nested document fields through
//!   dot-delimited paths, no struct definitions required
//! - **Change tracking** - Records diff themselves against their last persisted
//!   state and save as minimal partial updates
//! - **Access contexts** - Field-level read/write policies enforced before any
//!   change reaches storage
//! - **Multiple backends** - In-memory and MongoDB storage with an extensible
//!   trait system
//!
//! # Quick Start
//!
//! ```ignore
//! use odmlayer::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! struct User;
//!
//! impl Model for User {
//!     fn collection_name() -> &'static str {
//!         "users"
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     // Create an in-memory store backend
//!     let backend = InMemoryStore::builder().build().await.unwrap();
//!     let store = ModelStore::new(backend);
//!     let users = store.repository::<User>();
//!
//!     // Create a record
//!     let mut alice = users
//!         .create(&doc! { "name": "Alice" }, &SaveOptions::new())
//!         .await
//!         .unwrap();
//!
//!     // Mutate through paths; only the diff is written on save
//!     alice.set("profile.bio", "hello").unwrap();
//!     users.save(&mut alice, &SaveOptions::new()).await.unwrap();
//!
//!     // Query back
//!     let found = users
//!         .get(doc! { "name": "Alice" })
//!         .await
//!         .unwrap();
//!     println!("Found: {:?}", found.map(|r| r.state().clone()));
//!
//!     // Shutdown the store
//!     store.shutdown().await.unwrap();
//! }
//! ```
//!
//! # Access Contexts
//!
//! Models can declare named contexts restricting which fields are writable
//! (or readable). Saves under a context silently roll back out-of-context
//! edits instead of failing:
//!
//! ```ignore
//! use odmlayer::prelude::*;
//! use std::sync::LazyLock;
//!
//! struct Profile;
//!
//! impl Model for Profile {
//!     fn collection_name() -> &'static str {
//!         "profiles"
//!     }
//!
//!     fn contexts() -> &'static AccessContexts {
//!         static CONTEXTS: LazyLock<AccessContexts> = LazyLock::new(|| {
//!             AccessContexts::new()
//!                 .declare_writable(None, ["bio", "avatar"])
//!                 .declare_writable(Some("owner"), ["bio", "avatar", "email"])
//!         });
//!         &CONTEXTS
//!     }
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use odmlayer_core::{
    backend, change, context, cursor, error, model, path, record, repository, state,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use odmlayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use odmlayer_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}

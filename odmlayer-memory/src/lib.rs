//! In-memory storage backend for odmlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreBackend` trait. It uses async-aware read-write locks for concurrent
//! access and is ideal for development, testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Operator filters** - Supports the comparison operator subset plus `$in` and `$exists`
//! - **Cursor configuration** - Honors sort, skip, and limit on result cursors
//!
//! # Quick Start
//!
//! ```ignore
//! use odmlayer::{Model, ModelStore, SaveOptions, memory::InMemoryStore};
//! use bson::doc;
//!
//! struct User;
//!
//! impl Model for User {
//!     fn collection_name() -> &'static str { "users" }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = ModelStore::new(backend);
//!     let users = store.repository::<User>();
//!
//!     users.create(&doc! { "name": "Alice" }, &SaveOptions::new()).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as odmlayer_memory;

pub mod matcher;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};

//! MongoDB backend implementation for odmlayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend`
//! trait, enabling persistent record storage using MongoDB's query engine and
//! partial-update operators.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! odmlayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native partial updates** - `$set`/`$unset` patches map directly onto driver updates
//! - **Async/await** - Fully asynchronous API built on MongoDB's async driver
//! - **Cursor configuration** - Sort, skip, limit, batch size, and index hints all honored
//!
//! # Connection
//!
//! To use this backend, you need a MongoDB connection string. This can be
//! provided through the builder pattern.
//!
//! # Example
//!
//! ```ignore
//! use odmlayer::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as odmlayer_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};

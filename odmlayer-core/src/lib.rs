//! An object-document mapping layer over schemaless document stores, built
//! around change tracking and field-level access contexts.
//!
//! This crate is the core of the odmlayer project and provides:
//!
//! - **Path addressing** ([`path`]) - Dot-delimited navigation into nested documents
//! - **Dual-state records** ([`state`], [`record`]) - Working/persisted snapshot pairs
//! - **Access contexts** ([`context`]) - Field-level read/write policies by name
//! - **Change-set engine** ([`change`]) - Structural diffing and minimal patch synthesis
//! - **Model surface** ([`model`]) - The trait mapped entity types implement
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Result cursors** ([`cursor`]) - Typed, configurable traversal over query results
//! - **Persistence orchestration** ([`repository`]) - Save, reload, destroy, and finders
//! - **Error handling** ([`error`]) - Comprehensive error types and result types
//!
//! # Example
//!
//! ```ignore
//! use odmlayer::{Model, ModelStore, SaveOptions};
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
//! let store = ModelStore::new(backend);
//! let users = store.repository::<User>();
//!
//! let mut alice = users
//!     .create(&doc! { "name": "Alice" }, &SaveOptions::new())
//!     .await?;
//! alice.set("profile.bio", "hello")?;
//! users.save(&mut alice, &SaveOptions::new()).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as odmlayer_core;

pub mod backend;
pub mod change;
pub mod context;
pub mod cursor;
pub mod error;
pub mod model;
pub mod path;
pub mod record;
pub mod repository;
pub mod state;

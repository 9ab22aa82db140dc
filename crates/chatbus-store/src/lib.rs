//! # chatbus-store
//!
//! Durable storage for the chat backend, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for users,
//! sessions, contact rows and messages.  It is the source of truth; the
//! in-memory caches in `chatbus-core` mirror it.

pub mod contacts;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod sessions;
pub mod users;

mod error;

pub use database::Database;
pub use error::{OptionalRecord, Result, StoreError};
pub use models::*;

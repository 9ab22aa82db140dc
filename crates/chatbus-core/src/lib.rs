//! # chatbus-core
//!
//! In-process state for the chat backend.
//!
//! A single [`Chat`] context owns four concurrent caches that mirror the
//! store (users, sessions, contacts and per-user mailboxes), the handle to
//! the store itself and the write-behind queue that persists sent messages.
//! It is built once at startup, rehydrated with [`Chat::restore`], and
//! shared by `Arc` with request handlers and the [`SessionCuller`].

pub mod cache;
pub mod chat;
pub mod config;
pub mod cull;
pub mod error;
pub mod persistence;
pub mod restore;
pub mod write_behind;

pub use chat::{Chat, ContactEntry, NewMessage, UserLookup, UserPatch};
pub use config::ChatConfig;
pub use cull::{CullReport, SessionCuller};
pub use error::{ChatError, Result};
pub use persistence::Persistence;
pub use restore::{RestoreReport, Snapshot};
pub use write_behind::{WriteBehindQueue, WriteBehindStats};

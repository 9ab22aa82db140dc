//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric user identifier assigned by the database.
pub type UserId = i64;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A chat participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Database-assigned primary key.
    pub id: UserId,
    /// Opaque identifier supplied by the client on first contact.
    pub uuid: String,
    /// Human-readable display name. The only mutable field.
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An authenticated handle bound to one user. Its existence means the user
/// is online.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    #[serde(rename = "uuid")]
    pub id: Uuid,
    pub created_utc: DateTime<Utc>,
    /// Refreshed on every poll and send.
    pub last_active_utc: DateTime<Utc>,
    pub user_id: UserId,
    /// The resolved owner. Not stored in the `sessions` table.
    pub user: Option<User>,
}

impl Session {
    /// Build a fresh session for `user`, active as of `now`.
    pub fn new(user: User, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_utc: now,
            last_active_utc: now,
            user_id: user.id,
            user: Some(user),
        }
    }

    /// A session is expired once it has been idle for strictly longer than
    /// `timeout`.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_active_utc > timeout
    }
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// One direction of a contact edge. Every edge is stored as two rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Contact {
    pub sender: UserId,
    pub receiver: UserId,
}

impl Contact {
    /// The row for the opposite direction.
    pub fn mirrored(self) -> Self {
        Self {
            sender: self.receiver,
            receiver: self.sender,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.  Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "uuid")]
    pub id: Uuid,
    /// Ordering key within a mailbox.
    pub created_utc: DateTime<Utc>,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    /// Arbitrary client-defined payload, stored as JSON text.
    pub attachments: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Timestamp encoding
// ---------------------------------------------------------------------------

/// Timestamps are stored as fixed-width RFC-3339 strings with nanosecond
/// precision so that lexical order in SQL matches chronological order.
pub(crate) fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_timestamp(
    idx: usize,
    raw: &str,
) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn decode_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

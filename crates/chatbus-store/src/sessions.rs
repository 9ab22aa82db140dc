//! CRUD operations for [`Session`] records.
//!
//! The `user` field of a session is never stored; rows come back with
//! `user: None` and the cache layer resolves the owner.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{not_found_or, Result, StoreError};
use crate::models::{decode_timestamp, decode_uuid, encode_timestamp, Session};

impl Database {
    pub fn create_session(&self, session: &Session) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (uuid, created_utc, last_active_utc, user_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.id.to_string(),
                encode_timestamp(&session.created_utc),
                encode_timestamp(&session.last_active_utc),
                session.user_id,
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, id: Uuid) -> Result<Session> {
        self.conn()
            .query_row(
                "SELECT uuid, created_utc, last_active_utc, user_id
                 FROM sessions WHERE uuid = ?1",
                params![id.to_string()],
                row_to_session,
            )
            .map_err(not_found_or)
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut stmt = self.conn().prepare(
            "SELECT uuid, created_utc, last_active_utc, user_id
             FROM sessions
             ORDER BY created_utc ASC",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Persist a cached last-active timestamp.  Returns `true` if the session
    /// still exists.
    pub fn touch_session(&self, id: Uuid, last_active: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE sessions SET last_active_utc = ?2 WHERE uuid = ?1",
            params![id.to_string(), encode_timestamp(&last_active)],
        )?;
        Ok(affected > 0)
    }

    /// Delete a session.  Returns `true` if a row was deleted; deleting an
    /// already-deleted session is not an error.
    pub fn delete_session(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM sessions WHERE uuid = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(1)?;
    let active_str: String = row.get(2)?;

    Ok(Session {
        id: decode_uuid(0, &id_str)?,
        created_utc: decode_timestamp(1, &created_str)?,
        last_active_utc: decode_timestamp(2, &active_str)?,
        user_id: row.get(3)?,
        user: None,
    })
}

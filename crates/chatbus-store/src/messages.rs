use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{not_found_or, Result, StoreError};
use crate::models::{decode_timestamp, decode_uuid, encode_timestamp, Message};

const MESSAGE_COLUMNS: &str = "uuid, created_utc, sender, receiver, body, attachments";

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let attachments = message
            .attachments
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn().execute(
            "INSERT INTO messages (uuid, created_utc, sender, receiver, body, attachments)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                encode_timestamp(&message.created_utc),
                message.sender_id,
                message.receiver_id,
                message.body,
                attachments,
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE uuid = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found_or)
    }

    /// The newest `limit` messages for every receiver, returned oldest first
    /// across the whole result so they can be replayed in order.
    pub fn recent_messages_per_receiver(&self, limit: usize) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM (
                 SELECT ROW_NUMBER() OVER (
                            PARTITION BY receiver ORDER BY created_utc DESC
                        ) AS rn,
                        m.*
                 FROM messages m
             )
             WHERE rn <= ?1
             ORDER BY created_utc ASC"
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], row_to_message)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_messages(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(1)?;
    let attachments_str: Option<String> = row.get(5)?;

    let attachments = attachments_str
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id: decode_uuid(0, &id_str)?,
        created_utc: decode_timestamp(1, &created_str)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        body: row.get(4)?,
        attachments,
    })
}

//! CRUD operations for [`User`] records.

use rusqlite::params;

use crate::database::Database;
use crate::error::{not_found_or, Result, StoreError};
use crate::models::{User, UserId};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user and return it with its assigned id.
    pub fn create_user(&self, uuid: &str, display_name: &str) -> Result<User> {
        self.conn().execute(
            "INSERT INTO users (uuid, display_name) VALUES (?1, ?2)",
            params![uuid, display_name],
        )?;

        Ok(User {
            id: self.conn().last_insert_rowid(),
            uuid: uuid.to_string(),
            display_name: display_name.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single user by id.
    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, uuid, display_name FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .map_err(not_found_or)
    }

    /// Fetch a single user by its external uuid.
    pub fn get_user_by_uuid(&self, uuid: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, uuid, display_name FROM users WHERE uuid = ?1",
                params![uuid],
                row_to_user,
            )
            .map_err(not_found_or)
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS (SELECT 1 FROM users WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// List every user, ordered by id.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, uuid, display_name FROM users ORDER BY id ASC")?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Change a user's display name.  Returns `true` if a row was updated.
    pub fn update_user_display_name(&self, id: UserId, display_name: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET display_name = ?2 WHERE id = ?1",
            params![id, display_name],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a user by id.  Returns `true` if a row was deleted.
    ///
    /// ON DELETE CASCADE: the user's sessions, contact rows and messages go
    /// with it.
    pub fn delete_user(&self, id: UserId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        uuid: row.get(1)?,
        display_name: row.get(2)?,
    })
}

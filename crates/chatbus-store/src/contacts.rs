//! Contact rows.  An edge between two users is always written and removed as
//! a pair of directed rows.

use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Contact, UserId};

impl Database {
    pub fn contact_exists(&self, contact: Contact) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS (SELECT 1 FROM contacts WHERE sender = ?1 AND receiver = ?2)",
            params![contact.sender, contact.receiver],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Insert one directed row.  Inserting a row that already exists is a
    /// no-op.
    pub fn create_contact(&self, contact: Contact) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO contacts (sender, receiver) VALUES (?1, ?2)",
            params![contact.sender, contact.receiver],
        )?;
        Ok(())
    }

    /// Write both directions of the `a`/`b` edge in one transaction.
    pub fn link_contacts(&self, a: UserId, b: UserId) -> Result<()> {
        let edge = Contact {
            sender: a,
            receiver: b,
        };
        self.transaction(|| {
            for row in [edge, edge.mirrored()] {
                if !self.contact_exists(row)? {
                    self.create_contact(row)?;
                }
            }
            Ok(())
        })
    }

    /// Delete both directions of the `a`/`b` edge.  Returns the number of
    /// rows removed (0, 1 or 2).
    pub fn unlink_contacts(&self, a: UserId, b: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM contacts
             WHERE (sender = ?1 AND receiver = ?2)
                OR (sender = ?2 AND receiver = ?1)",
            params![a, b],
        )?;
        Ok(affected)
    }

    /// Every stored row, both directions included.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT sender, receiver FROM contacts ORDER BY sender, receiver")?;
        let rows = stmt.query_map([], |row| {
            Ok(Contact {
                sender: row.get(0)?,
                receiver: row.get(1)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

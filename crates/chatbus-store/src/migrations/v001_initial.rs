//! v001 -- Initial schema creation.
//!
//! Creates the four chat tables: `users`, `sessions`, `contacts` and
//! `messages`.  Everything that references a user is removed with it.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid         TEXT NOT NULL UNIQUE,        -- opaque external identifier
    display_name TEXT NOT NULL DEFAULT ''
);

-- ----------------------------------------------------------------
-- Sessions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    uuid            TEXT PRIMARY KEY NOT NULL, -- UUID v4
    created_utc     TEXT NOT NULL,             -- RFC-3339, nanosecond precision
    last_active_utc TEXT NOT NULL,
    user_id         INTEGER NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);

-- ----------------------------------------------------------------
-- Contacts (one row per direction)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    sender   INTEGER NOT NULL,
    receiver INTEGER NOT NULL,

    PRIMARY KEY (sender, receiver),
    FOREIGN KEY (sender)   REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (receiver) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    uuid        TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    created_utc TEXT NOT NULL,
    sender      INTEGER NOT NULL,
    receiver    INTEGER NOT NULL,
    body        TEXT NOT NULL CHECK (length(body) <= 1024),
    attachments TEXT,                         -- JSON blob, nullable

    FOREIGN KEY (sender)   REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (receiver) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_receiver_created
    ON messages(receiver, created_utc DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

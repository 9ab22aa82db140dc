//! Shared handle to the persistent store.
//!
//! One SQLite connection is shared by the whole process.  Every call runs on
//! tokio's blocking pool so async tasks never wait on disk I/O, and callers
//! must not hold a cache lock while awaiting it.

use std::sync::{Arc, Mutex};

use chatbus_store::Database;

use crate::error::{ChatError, Result};

#[derive(Clone)]
pub struct Persistence {
    db: Arc<Mutex<Database>>,
}

impl Persistence {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the database on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> chatbus_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|_| ChatError::Internal("database lock poisoned".into()))?;
            f(&guard).map_err(ChatError::from)
        })
        .await
        .map_err(|e| ChatError::Internal(format!("store task failed: {e}")))?
    }
}

//! Tunables for the cache layer and its background tasks.

use std::time::Duration;

/// Maximum number of messages kept per mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1 << 10;

/// Idle time after which a session is culled.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Interval between two cull sweeps.
pub const DEFAULT_CULL_INTERVAL: Duration = Duration::from_secs(60);

/// Size of the write-behind worker pool.
pub const DEFAULT_PERSISTENCE_WORKERS: usize = 2;

/// Longest accepted message body, in characters.  Matches the column check
/// in the `messages` table.
pub const MAX_BODY_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Capacity `Q` of every mailbox.  Also the per-receiver message limit
    /// used when restoring from the store.
    pub mailbox_capacity: usize,
    pub session_timeout: Duration,
    pub cull_interval: Duration,
    pub persistence_workers: usize,
    pub max_body_len: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            cull_interval: DEFAULT_CULL_INTERVAL,
            persistence_workers: DEFAULT_PERSISTENCE_WORKERS,
            max_body_len: MAX_BODY_LEN,
        }
    }
}

impl ChatConfig {
    /// The session timeout as a `chrono` duration, for comparisons against
    /// stored timestamps.
    pub fn session_timeout_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.session_timeout).unwrap_or(chrono::Duration::MAX)
    }
}

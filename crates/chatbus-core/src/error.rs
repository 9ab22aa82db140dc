use chatbus_store::StoreError;
use thiserror::Error;

/// Errors surfaced by chat actions.
///
/// Cache misses are never errors by themselves; an action turns a miss into
/// [`ChatError::NotFound`] only when the referenced entity is required.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A referenced user or session does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Any failure reported by the persistent store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Failures around the store rather than inside it (poisoned lock,
    /// panicked blocking task).
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;

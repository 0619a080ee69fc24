//! Durable upload queue for Obscura.
//!
//! The queue is the single source of truth for "what must still be sent"
//! and survives process restarts. Timestamps are always supplied by the
//! caller, never read internally, so the store stays deterministic.

pub mod retry;
pub mod store;

use obscura_types::TaskId;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors from the durable queue.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Storage(String),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("corrupt queue row: {0}")]
    CorruptRow(String),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Storage(e.to_string())
    }
}

pub use retry::{RetryDecision, RetryPolicy};
pub use store::UploadQueue;

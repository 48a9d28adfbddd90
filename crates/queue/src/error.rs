//! Queue error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job '{0}' not found")]
    NotFound(uuid::Uuid),

    #[error("queue backend error: {0}")]
    Backend(String),
}

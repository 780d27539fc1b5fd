use std::time::Duration;

use roost_model::{SpawnTaskId, SpawnerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("spawn task not found: {0}")]
    TaskNotFound(SpawnTaskId),

    #[error("spawner not found: {0}")]
    SpawnerNotFound(SpawnerId),

    #[error("duplicate request: {0}")]
    DuplicateRequest(String),

    #[error("no spawner available: {0}")]
    NoCapacity(String),

    #[error("spawn task {0} is already finalized")]
    AlreadyFinalized(SpawnTaskId),

    #[error("spawn task {0} is not finalized")]
    NotFinalized(SpawnTaskId),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("link error: {0}")]
    Link(#[from] LinkError),
}

/// Failure talking to the other side of a link (worker or master).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl LinkError {
    /// Transport failures may succeed on retry; an explicit refusal never does.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LinkError::Rejected(_))
    }
}

impl From<CoreError> for LinkError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Link(inner) => inner,
            other => LinkError::Rejected(other.to_string()),
        }
    }
}

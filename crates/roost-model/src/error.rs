use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid spawn status: '{0}' (valid: aborted, aborting, none, waiting, registered, finalized, killed)")]
    InvalidStatus(String),
    #[error("invalid id: '{0}'")]
    InvalidId(String),
}

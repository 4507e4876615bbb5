//! Error types for container engines

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{0} is required but was not found in PATH")]
    BinaryNotFound(String),

    /// The engine reported that the object does not exist
    #[error("{0}")]
    NotFound(String),

    #[error("failed to inspect container: {0}")]
    Inspect(String),

    #[error("failed to create container: {0}")]
    Create(String),

    #[error("failed to start container: {0}")]
    Start(String),

    #[error("failed to commit snapshot: {0}")]
    Commit(String),

    #[error("exec failed: {0}")]
    Exec(String),

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

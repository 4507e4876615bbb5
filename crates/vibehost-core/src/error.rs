//! Error types for vibehost-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] vibehost_config::ConfigError),

    #[error("{0}")]
    Provider(#[from] vibehost_provider::ProviderError),

    #[error("{0}")]
    Usage(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("no host given and no default host configured; use <app>@<host> or `vibehost config --default-host <host>`")]
    MissingHost,

    #[error("{0} is required but was not found in PATH")]
    MissingBinary(String),

    #[error("invalid agent provider: unsupported provider {0:?}")]
    InvalidAgent(String),

    #[error("failed to load server state at {path}: {reason}")]
    StateCorrupted { path: String, reason: String },

    #[error("no snapshots found for {0}")]
    NoSnapshots(String),

    #[error("{0}")]
    Snapshot(String),

    #[error("{0}")]
    Probe(String),

    #[error("failed to start ssh: {0}")]
    Transport(String),

    #[error("{0}")]
    Port(String),

    #[error("aborted")]
    Aborted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) | Self::InvalidTarget(_) | Self::MissingHost | Self::InvalidAgent(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

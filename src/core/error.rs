//! Error types for graft.

use thiserror::Error;

/// Result type alias for graft operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in graft operations.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Dataset errors
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    // Checkpoint errors
    #[error("checkpoint not found: {}", .0.display())]
    CheckpointMissing(std::path::PathBuf),

    #[error("malformed parameter name: {0}")]
    MalformedParamName(String),

    // Serialization errors
    #[error("serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

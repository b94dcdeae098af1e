//! I/O error types.

use thiserror::Error;

/// Result type for I/O and pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Sidecar metadata (de)serialization error.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] ptychoprep_core::Error),
}

//! Storage engine error types
//!
//! Defines all errors that can occur in the recording engine. `Quality::Bad`
//! samples are in-band data and never surface through this type.

use thiserror::Error;

/// Errors that can occur in the recording engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested series does not exist
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    /// Data corruption detected (checksum mismatch, out-of-window record, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Slot file format error (bad magic, unsupported version)
    #[error("Invalid slot file: {0}")]
    InvalidSlot(String),

    /// Invalid time range (start > end)
    #[error("Invalid time range: start must not exceed end")]
    InvalidTimeRange,

    /// Invalid reduction window width
    #[error("Invalid window width: {0} ms (must be positive)")]
    InvalidWindow(i64),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

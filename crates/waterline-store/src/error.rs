//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record decoding or validation failed.
    #[error("record error: {0}")]
    Record(#[from] waterline_core::CoreError),

    /// Envelope serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The file was written by a newer format version.
    #[error("unsupported format version {found} (max {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Stored digest does not match the decoded records.
    #[error("digest mismatch: stored {stored}, computed {computed}")]
    DigestMismatch { stored: String, computed: String },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The save was cancelled before it replaced the durable file.
    #[error("save cancelled")]
    Cancelled,

    /// Internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// The blocking I/O task failed to complete.
    #[error("blocking task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Whether this error came from a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

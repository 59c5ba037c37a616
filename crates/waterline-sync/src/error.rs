//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur talking to the external health store.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The external store does not exist on this device.
    #[error("health store unavailable")]
    Unavailable,

    /// Access was never granted, or sharing is denied.
    #[error("not authorized for {0}")]
    NotAuthorized(&'static str),

    /// An anchored query failed.
    #[error("query failed: {0}")]
    Query(String),

    /// Writing a sample failed.
    #[error("write failed: {0}")]
    Write(String),

    /// The anchor handed to the store is not one it issued.
    #[error("malformed anchor: {0}")]
    MalformedAnchor(String),

    /// A record built from a sample failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] waterline_core::ValidationError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

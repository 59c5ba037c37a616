//! Error types for the engine.

use thiserror::Error;
use waterline_core::ValidationError;
use waterline_store::StoreError;
use waterline_sync::SyncError;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration could not be read or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Scheduling the next background refresh failed.
    #[error("refresh scheduling failed: {0}")]
    Schedule(String),

    /// The coordination task is gone.
    #[error("engine has shut down")]
    Closed,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

//! Error types for Waterline Core.

use thiserror::Error;

/// Core errors that can occur while encoding or decoding records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("invalid record id: {0}")]
    InvalidId(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Validation errors for record contents.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("amount must be non-negative, got {0}")]
    NegativeAmount(f64),

    #[error("amount must be finite")]
    NonFiniteAmount,

    #[error("reference unit must be positive, got {0}")]
    InvalidReferenceUnit(f64),

    #[error("thresholds must be ascending: low={low}, high={high}")]
    UnorderedThresholds { low: f64, high: f64 },
}

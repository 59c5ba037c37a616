//! Record validation: amount checks shared by every construction path.

use crate::error::ValidationError;
use crate::record::Record;

/// Validate an intake amount.
///
/// Amounts must be finite and non-negative. Zero is allowed.
pub fn validate_amount(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() {
        return Err(ValidationError::NonFiniteAmount);
    }
    if amount < 0.0 {
        return Err(ValidationError::NegativeAmount(amount));
    }
    Ok(())
}

/// Validate an already-built record.
///
/// `Record` constructors validate, so this only matters for records that
/// arrived through deserialization.
pub fn validate_record(record: &Record) -> Result<(), ValidationError> {
    validate_amount(record.amount())
}

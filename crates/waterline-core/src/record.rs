//! Record: one timestamped intake event.
//!
//! Records are immutable. A change is modeled as deleting the old record and
//! creating a new one, never as editing fields in place.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{RecordId, Timestamp};
use crate::validation::validate_amount;

/// A single intake event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    amount: f64,
    timestamp: Timestamp,
    id: RecordId,
}

impl Record {
    /// Create a record with a freshly generated id.
    pub fn new(amount: f64, timestamp: Timestamp) -> Result<Self, ValidationError> {
        Self::with_id(amount, timestamp, RecordId::generate())
    }

    /// Create a record with a known id (external samples, decoding).
    pub fn with_id(
        amount: f64,
        timestamp: Timestamp,
        id: RecordId,
    ) -> Result<Self, ValidationError> {
        validate_amount(amount)?;
        Ok(Self {
            amount,
            timestamp,
            id,
        })
    }

    /// Quantity in millilitres.
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// When the intake happened.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// The merge/dedup key.
    pub fn id(&self) -> RecordId {
        self.id
    }
}

/// Sort records by ascending timestamp.
///
/// The sort is stable so records sharing a timestamp keep insertion order.
pub fn sort_by_time(records: &mut [Record]) {
    records.sort_by_key(|r| r.timestamp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_gets_unique_id() {
        let a = Record::new(250.0, Timestamp(1_000)).unwrap();
        let b = Record::new(250.0, Timestamp(1_000)).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let err = Record::new(-1.0, Timestamp(0)).unwrap_err();
        assert_eq!(err, ValidationError::NegativeAmount(-1.0));
    }

    #[test]
    fn test_sort_is_stable() {
        let first = Record::new(1.0, Timestamp(5)).unwrap();
        let second = Record::new(2.0, Timestamp(5)).unwrap();
        let earliest = Record::new(3.0, Timestamp(1)).unwrap();

        let mut records = vec![first.clone(), second.clone(), earliest.clone()];
        sort_by_time(&mut records);

        assert_eq!(records, vec![earliest, first, second]);
    }

    #[test]
    fn test_record_json_shape() {
        let id = RecordId::from_bytes([1; 16]);
        let record = Record::with_id(300.0, Timestamp(42), id).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["amount"], 300.0);
        assert_eq!(json["timestamp"], 42);
    }
}

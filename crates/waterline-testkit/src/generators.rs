//! Proptest generators for property-based testing.

use std::time::Duration;

use proptest::prelude::*;

use waterline_core::{Record, RecordId, Timestamp};

/// Generate a random RecordId.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    any::<[u8; 16]>().prop_map(RecordId::from_bytes)
}

/// Generate a valid amount in millilitres.
pub fn amount() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(0.0),
        Just(250.0),
        Just(500.0),
        Just(1000.0),
        0.0f64..5000.0,
    ]
}

/// Generate a timestamp within `spread` of `center`, either side.
pub fn timestamp_near(center: Timestamp, spread: Duration) -> impl Strategy<Value = Timestamp> {
    let spread = i64::try_from(spread.as_millis()).unwrap_or(i64::MAX / 4);
    (-spread..=spread).prop_map(move |offset| Timestamp(center.0.saturating_add(offset)))
}

/// Generate a record near `center`.
pub fn record_near(center: Timestamp, spread: Duration) -> impl Strategy<Value = Record> {
    (amount(), timestamp_near(center, spread), record_id()).prop_map(|(amount, ts, id)| {
        Record::with_id(amount, ts, id).expect("generated amounts are valid")
    })
}

/// Generate a record set near `center` with unique ids.
pub fn record_set(
    center: Timestamp,
    spread: Duration,
    max_len: usize,
) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(record_near(center, spread), 0..=max_len).prop_map(|mut records| {
        let mut seen = std::collections::HashSet::new();
        records.retain(|r| seen.insert(r.id()));
        records
    })
}

//! # Waterline Core
//!
//! Pure primitives for Waterline: intake records, the retention window, and
//! the aggregates shown on the watch face.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over an in-memory record set.
//!
//! ## Key Types
//!
//! - [`Record`] - One timestamped intake event, the atomic unit of state
//! - [`RecordId`] - 128-bit identifier used as the merge/dedup key
//! - [`Timestamp`] - Unix milliseconds
//! - [`RetentionWindow`] - The trailing 24-hour window of active records
//! - [`Thresholds`] / [`StatusLevel`] - Configurable status banding
//!
//! ## Canonicalization
//!
//! Record sets are encoded using deterministic CBOR. See [`canonical`] module.

pub mod aggregate;
pub mod canonical;
pub mod clock;
pub mod error;
pub mod record;
pub mod retention;
pub mod types;
pub mod validation;

pub use aggregate::{
    current_total, daily_equivalent_count, status_level, DayBoundary, Serving, StatusLevel,
    Thresholds,
};
pub use canonical::{
    canonical_records_bytes, decode_records, encode_canonical, records_digest, records_from_value,
    Digest,
};
pub use clock::{Clock, SystemClock};
pub use error::{CoreError, ValidationError};
pub use record::{sort_by_time, Record};
pub use retention::{retain_window, RetentionWindow, RETENTION_WINDOW};
pub use types::{RecordId, Timestamp};
pub use validation::{validate_amount, validate_record};

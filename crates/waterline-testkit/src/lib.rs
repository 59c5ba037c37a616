//! # Waterline Testkit
//!
//! Testing utilities for Waterline.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an in-memory store, health store and pinned clock, shared by `Arc`
//! - **ManualClock**: a [`Clock`](waterline_core::Clock) tests move by hand
//! - **Generators**: Proptest strategies for records and record sets
//! - **Golden vectors**: the exact canonical bytes of known record sets
//!
//! ## Test Fixtures
//!
//! ```rust
//! use std::time::Duration;
//! use waterline_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let id = fixture.insert_foreign(250.0, fixture.ago(Duration::from_secs(60)));
//! assert_eq!(fixture.health.samples()[0].uuid, id);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use waterline_core::RETENTION_WINDOW;
//! use waterline_testkit::{fixtures::NOON, generators::record_set};
//!
//! proptest! {
//!     #[test]
//!     fn retention_is_idempotent(records in record_set(NOON, RETENTION_WINDOW * 2, 32)) {
//!         // ...
//!     }
//! }
//! ```

pub mod clock;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use clock::ManualClock;
pub use fixtures::{records_at, TestFixture, APP_SOURCE, NOON, PHONE_SOURCE};
pub use generators::{amount, record_id, record_near, record_set, timestamp_near};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};

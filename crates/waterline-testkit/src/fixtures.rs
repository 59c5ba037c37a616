//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an in-memory store, an
//! in-memory health store and a pinned clock, all shared through `Arc` so a
//! test can keep poking at them after handing them to the engine.

use std::sync::Arc;
use std::time::Duration;

use waterline_core::{Record, RecordId, Timestamp};
use waterline_store::MemoryStore;
use waterline_sync::{MemoryHealthStore, SampleMetadata, SourceId};

use crate::clock::ManualClock;

/// 2021-09-22T12:00:00Z, a fixed "now" for tests.
pub const NOON: Timestamp = Timestamp(1_632_312_000_000);

/// Source identity of the application under test.
pub const APP_SOURCE: &str = "app.waterline";

/// Source identity of a different writer to the health store.
pub const PHONE_SOURCE: &str = "phone.health";

/// Shared collaborators for one test.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub health: Arc<MemoryHealthStore>,
    pub clock: Arc<ManualClock>,
}

impl TestFixture {
    /// Fresh store and health store, clock pinned at [`NOON`].
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Start from an existing store, e.g. one seeded with records.
    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            store: Arc::new(store),
            health: Arc::new(MemoryHealthStore::new(SourceId::new(APP_SOURCE))),
            clock: Arc::new(ManualClock::new(NOON)),
        }
    }

    /// Same, with a health store that is missing on this device.
    pub fn without_health_store() -> Self {
        Self {
            health: Arc::new(MemoryHealthStore::unavailable(SourceId::new(APP_SOURCE))),
            ..Self::new()
        }
    }

    pub fn now(&self) -> Timestamp {
        waterline_core::Clock::now(&*self.clock)
    }

    /// An instant `ago` before the fixture's now.
    pub fn ago(&self, ago: Duration) -> Timestamp {
        self.now() - ago
    }

    /// Write a sample from another application. Returns its store id.
    pub fn insert_foreign(&self, amount: f64, at: Timestamp) -> RecordId {
        self.health.insert_from(
            SourceId::new(PHONE_SOURCE),
            amount,
            at,
            SampleMetadata::default(),
        )
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Build records at the given (amount, instant) pairs.
pub fn records_at(entries: &[(f64, Timestamp)]) -> Vec<Record> {
    entries
        .iter()
        .map(|(amount, at)| Record::new(*amount, *at).expect("test amounts are valid"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use waterline_store::PersistenceStore;
    use waterline_sync::HealthStore;

    #[tokio::test]
    async fn test_fixture_defaults() {
        let fixture = TestFixture::new();
        assert_eq!(fixture.now(), NOON);
        assert!(fixture.store.load().await.unwrap().is_empty());
        assert!(fixture.health.is_available());
        assert_eq!(fixture.health.local_source(), SourceId::new(APP_SOURCE));
    }

    #[test]
    fn test_foreign_samples_carry_other_source() {
        let fixture = TestFixture::new();
        let id = fixture.insert_foreign(250.0, fixture.ago(Duration::from_secs(60)));

        let samples = fixture.health.samples();
        assert_eq!(samples[0].uuid, id);
        assert_eq!(samples[0].source, SourceId::new(PHONE_SOURCE));
    }

    #[test]
    fn test_without_health_store() {
        let fixture = TestFixture::without_health_store();
        assert!(!fixture.health.is_available());
    }
}

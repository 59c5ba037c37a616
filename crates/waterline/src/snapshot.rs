//! Published views of the record set.
//!
//! A [`Snapshot`] is an immutable, cheaply cloned copy of the record set as
//! of one mutation. Readers hold snapshots; only the coordination task ever
//! builds a new one.

use std::sync::Arc;

use waterline_core::{
    current_total, daily_equivalent_count, status_level, Record, RecordId, StatusLevel, Timestamp,
};

use crate::config::AggregateConfig;

/// An immutable record set plus the settings its aggregates use.
#[derive(Debug, Clone)]
pub struct Snapshot {
    records: Arc<[Record]>,
    version: u64,
    settings: AggregateConfig,
}

impl Snapshot {
    pub(crate) fn new(records: Arc<[Record]>, version: u64, settings: AggregateConfig) -> Self {
        Self {
            records,
            version,
            settings,
        }
    }

    /// Records in ascending timestamp order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn shared_records(&self) -> Arc<[Record]> {
        Arc::clone(&self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Increases by one with every publish.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.iter().any(|r| r.id() == id)
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn settings(&self) -> &AggregateConfig {
        &self.settings
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregates
    // ─────────────────────────────────────────────────────────────────────────

    /// Millilitres recorded at or before `as_of`.
    pub fn current_total(&self, as_of: Timestamp) -> f64 {
        current_total(&self.records, as_of)
    }

    /// Today's intake in multiples of the configured reference serving.
    pub fn daily_equivalent_count(&self, now: Timestamp) -> f64 {
        daily_equivalent_count(
            &self.records,
            now,
            self.settings.reference_unit.millilitres(),
            self.settings.day_boundary(),
        )
    }

    /// Band of the running total at `as_of`.
    pub fn dose_level(&self, as_of: Timestamp) -> StatusLevel {
        status_level(self.current_total(as_of), self.settings.dose_thresholds)
    }

    /// Band of today's daily-equivalent count.
    pub fn daily_level(&self, now: Timestamp) -> StatusLevel {
        status_level(
            self.daily_equivalent_count(now),
            self.settings.daily_thresholds,
        )
    }
}

//! Widget timeline entries.
//!
//! Watch-face widgets render ahead of time: the host asks for the values at
//! a run of future instants and shows each one when its time arrives.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use waterline_core::{StatusLevel, Timestamp};

use crate::snapshot::Snapshot;

/// What a widget shows at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: Timestamp,
    /// Millilitres recorded at or before `at`.
    pub total_ml: f64,
    /// Today's intake in reference servings, as of `at`.
    pub daily_equivalent: f64,
    /// Band of `total_ml`.
    pub level: StatusLevel,
}

impl Snapshot {
    /// The entry for a single instant, past or future.
    pub fn timeline_entry(&self, at: Timestamp) -> TimelineEntry {
        TimelineEntry {
            at,
            total_ml: self.current_total(at),
            daily_equivalent: self.daily_equivalent_count(at),
            level: self.dose_level(at),
        }
    }

    /// Up to `limit` entries spaced `step` apart, the first one `step` after
    /// `after`. A zero step yields a single entry at `after`.
    pub fn timeline_entries(
        &self,
        after: Timestamp,
        limit: usize,
        step: Duration,
    ) -> Vec<TimelineEntry> {
        if limit == 0 {
            return Vec::new();
        }
        if step.is_zero() {
            return vec![self.timeline_entry(after)];
        }

        let mut entries = Vec::with_capacity(limit);
        let mut at = after;
        for _ in 0..limit {
            at = at + step;
            entries.push(self.timeline_entry(at));
        }
        entries
    }
}

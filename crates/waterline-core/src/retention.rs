//! The rolling retention window.
//!
//! Only records from the trailing 24 hours are active. The filter runs after
//! every mutation that adds records. It is never used to decide deletions:
//! deleted records are removed by id no matter how old they are.

use std::time::Duration;

use crate::record::Record;
use crate::types::Timestamp;

/// Length of the active window.
pub const RETENTION_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// A trailing time window ending at "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    length: Duration,
}

impl RetentionWindow {
    pub const fn new(length: Duration) -> Self {
        Self { length }
    }

    pub const fn length(&self) -> Duration {
        self.length
    }

    /// Earliest instant still inside the window.
    pub fn start(&self, now: Timestamp) -> Timestamp {
        now - self.length
    }

    /// `[start, now]`, both ends inclusive.
    pub fn contains(&self, ts: Timestamp, now: Timestamp) -> bool {
        self.start(now) <= ts && ts <= now
    }

    /// Keep the records inside the window, preserving order.
    pub fn apply(&self, records: &[Record], now: Timestamp) -> Vec<Record> {
        records
            .iter()
            .filter(|r| self.contains(r.timestamp(), now))
            .cloned()
            .collect()
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self::new(RETENTION_WINDOW)
    }
}

/// Apply the default 24-hour window.
pub fn retain_window(records: &[Record], now: Timestamp) -> Vec<Record> {
    RetentionWindow::default().apply(records, now)
}

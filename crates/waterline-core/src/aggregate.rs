//! Aggregates over a record set.
//!
//! Stateless functions consumed by the presentation and widget layers. They
//! operate on an already-windowed set, so none of them re-applies retention.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::record::Record;
use crate::types::Timestamp;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Sum of `amount` for every record at or before `as_of`.
///
/// Timeline renderers call this with past and future instants.
pub fn current_total(records: &[Record], as_of: Timestamp) -> f64 {
    records
        .iter()
        .filter(|r| r.timestamp() <= as_of)
        .map(Record::amount)
        .sum()
}

/// Today's intake expressed in multiples of `reference_unit`.
///
/// Counts records with `timestamp >= start_of_day(now)`. A non-positive
/// reference unit yields zero rather than a division by zero.
pub fn daily_equivalent_count(
    records: &[Record],
    now: Timestamp,
    reference_unit: f64,
    day: DayBoundary,
) -> f64 {
    if reference_unit <= 0.0 || !reference_unit.is_finite() {
        return 0.0;
    }
    let midnight = day.start_of_day(now);
    let total: f64 = records
        .iter()
        .filter(|r| r.timestamp() >= midnight)
        .map(Record::amount)
        .sum();
    total / reference_unit
}

/// Map a value onto a status band.
pub fn status_level(value: f64, thresholds: Thresholds) -> StatusLevel {
    if value < thresholds.low {
        StatusLevel::Low
    } else if value < thresholds.high {
        StatusLevel::Medium
    } else {
        StatusLevel::High
    }
}

/// Status band for a displayed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusLevel {
    Low,
    Medium,
    High,
}

/// Two ascending thresholds splitting values into three bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    pub fn new(low: f64, high: f64) -> Result<Self, ValidationError> {
        let thresholds = Self { low, high };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.low <= self.high) {
            return Err(ValidationError::UnorderedThresholds {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }

    /// Millilitres over the trailing window.
    pub const DOSE: Thresholds = Thresholds {
        low: 200.0,
        high: 400.0,
    };

    /// Reference units drunk today.
    pub const DAILY: Thresholds = Thresholds {
        low: 3.0,
        high: 5.0,
    };
}

/// Where a calendar day starts, as a fixed offset from UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DayBoundary {
    pub utc_offset_minutes: i32,
}

impl DayBoundary {
    pub const UTC: DayBoundary = DayBoundary {
        utc_offset_minutes: 0,
    };

    pub const fn with_offset_minutes(utc_offset_minutes: i32) -> Self {
        Self { utc_offset_minutes }
    }

    /// Local midnight at or before `now`.
    pub fn start_of_day(&self, now: Timestamp) -> Timestamp {
        let offset = i64::from(self.utc_offset_minutes) * 60 * 1000;
        let local = now.0.saturating_add(offset);
        let local_midnight = local - local.rem_euclid(DAY_MS);
        Timestamp(local_midnight.saturating_sub(offset))
    }
}

/// Standard serving sizes offered by the drink picker.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Serving {
    #[default]
    Cup,
    Bottle,
    Liter,
    Custom(f64),
}

impl Serving {
    pub fn millilitres(&self) -> f64 {
        match self {
            Serving::Cup => 250.0,
            Serving::Bottle => 500.0,
            Serving::Liter => 1000.0,
            Serving::Custom(ml) => *ml,
        }
    }

    pub fn label(&self) -> String {
        format!("{} mL", self.millilitres())
    }
}

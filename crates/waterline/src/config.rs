//! Engine configuration.
//!
//! Every field has a default, so a JSON file only needs to name what it
//! overrides. Durations are written as whole seconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use waterline_core::{
    DayBoundary, RetentionWindow, Serving, Thresholds, ValidationError, RETENTION_WINDOW,
};
use waterline_store::{FileStore, CURSOR_FILE, RECORDS_FILE};

use crate::error::{EngineError, Result};

/// Configuration for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub aggregate: AggregateConfig,
    /// Preferred delay before the next background refresh.
    #[serde(with = "secs")]
    pub refresh_interval: Duration,
    /// Capacity of the command channel into the coordination task.
    pub command_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            sync: SyncConfig::default(),
            aggregate: AggregateConfig::default(),
            refresh_interval: Duration::from_secs(15 * 60),
            command_queue_depth: 64,
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        let unit = self.aggregate.reference_unit.millilitres();
        if !unit.is_finite() || unit <= 0.0 {
            return Err(ValidationError::InvalidReferenceUnit(unit).into());
        }
        self.aggregate.dose_thresholds.validate()?;
        self.aggregate.daily_thresholds.validate()?;

        // Real-world offsets span UTC-12:00 to UTC+14:00.
        if !(-12 * 60..=14 * 60).contains(&self.aggregate.utc_offset_minutes) {
            return Err(EngineError::Config(format!(
                "utc_offset_minutes out of range: {}",
                self.aggregate.utc_offset_minutes
            )));
        }
        if self.sync.retention_window.is_zero() {
            return Err(EngineError::Config("retention_window must be positive".into()));
        }
        if self.command_queue_depth == 0 {
            return Err(EngineError::Config("command_queue_depth must be positive".into()));
        }
        if self.store.records_file == self.store.cursor_file {
            return Err(EngineError::Config(
                "records_file and cursor_file must differ".into(),
            ));
        }
        Ok(())
    }
}

/// Where persisted state lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub records_file: String,
    pub cursor_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("waterline-data"),
            records_file: RECORDS_FILE.to_string(),
            cursor_file: CURSOR_FILE.to_string(),
        }
    }
}

impl StoreConfig {
    /// Open the file store this configuration describes.
    pub fn open(&self) -> Result<FileStore> {
        Ok(FileStore::with_file_names(
            &self.data_dir,
            &self.records_file,
            &self.cursor_file,
        )?)
    }
}

/// External synchronization settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Only records this recent are kept and queried.
    #[serde(with = "secs")]
    pub retention_window: Duration,
    /// Pull from the external store right after hydration.
    pub sync_on_start: bool,
    /// Failed pushes kept for retry; zero disables retrying.
    pub push_retry_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retention_window: RETENTION_WINDOW,
            sync_on_start: true,
            push_retry_capacity: 32,
        }
    }
}

impl SyncConfig {
    pub fn window(&self) -> RetentionWindow {
        RetentionWindow::new(self.retention_window)
    }
}

/// Parameters of the derived statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Serving the daily-equivalent count is expressed in.
    pub reference_unit: Serving,
    /// Levels for the running total in millilitres.
    pub dose_thresholds: Thresholds,
    /// Levels for the daily-equivalent count.
    pub daily_thresholds: Thresholds,
    /// Offset of local time from UTC, used to find midnight.
    pub utc_offset_minutes: i32,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            reference_unit: Serving::Cup,
            dose_thresholds: Thresholds::DOSE,
            daily_thresholds: Thresholds::DAILY,
            utc_offset_minutes: 0,
        }
    }
}

impl AggregateConfig {
    pub fn day_boundary(&self) -> DayBoundary {
        DayBoundary::with_offset_minutes(self.utc_offset_minutes)
    }
}

/// Serialize a `Duration` as whole seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

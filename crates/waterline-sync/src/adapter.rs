//! The sync adapter: authorization, anchored pulls and pushes.
//!
//! The adapter translates between Waterline records and external samples.
//! It holds no record state of its own; the engine owns the record set and
//! the cursor and hands them in per call.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};
use waterline_core::{Record, RecordId, RetentionWindow, Timestamp};
use waterline_store::SyncCursor;

use crate::error::{Result, SyncError};
use crate::health_store::{
    AnchoredQuery, AuthorizationStatus, DeletedObject, HealthStore, QuantitySample,
    SampleMetadata, SampleType, TimeRange, SCHEMA_VERSION,
};

/// A deletion reported by the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedRef {
    /// The store's identifier for the deleted sample.
    pub external_id: RecordId,
    /// The Waterline id embedded when the sample was pushed, if any.
    pub app_id: Option<RecordId>,
}

impl DeletedRef {
    /// The record id this deletion refers to.
    ///
    /// Prefers the embedded application id. Externally created records use
    /// the store's identifier as their id, so the fallback matches them.
    pub fn target(&self) -> RecordId {
        self.app_id.unwrap_or(self.external_id)
    }

    fn from_object(object: &DeletedObject) -> Self {
        let app_id = object
            .metadata
            .sync_identifier
            .as_deref()
            .and_then(|s| s.parse::<RecordId>().ok());
        Self {
            external_id: object.uuid,
            app_id,
        }
    }
}

/// Outcome of one pull.
#[derive(Debug, Clone)]
pub struct PullResult {
    /// Samples written by other applications since the cursor.
    pub new_records: Vec<Record>,
    /// Samples deleted since the cursor.
    pub deleted: Vec<DeletedRef>,
    /// Cursor for the next pull.
    pub new_cursor: SyncCursor,
    /// Samples dropped because their quantity was invalid.
    pub skipped: usize,
}

/// Talks to the external store on behalf of the engine.
pub struct SyncAdapter<H: HealthStore> {
    health: H,
    authorized: AtomicBool,
}

impl<H: HealthStore> SyncAdapter<H> {
    /// The sample types read and written.
    pub const TYPES: [SampleType; 1] = [SampleType::DietaryWater];

    pub fn new(health: H) -> Self {
        Self {
            health,
            authorized: AtomicBool::new(false),
        }
    }

    pub fn health(&self) -> &H {
        &self.health
    }

    /// Whether a previous [`authorize`](Self::authorize) succeeded.
    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Acquire)
    }

    /// Negotiate access to the external store.
    ///
    /// Returns `false` if the store is unavailable, access was denied, or the
    /// request failed. The grant is remembered.
    pub async fn authorize(&self) -> bool {
        if !self.health.is_available() {
            debug!("health store unavailable, skipping authorization");
            return false;
        }

        match self
            .health
            .request_authorization(&Self::TYPES, &Self::TYPES)
            .await
        {
            Ok(granted) => {
                self.authorized.store(granted, Ordering::Release);
                debug!(granted, "health store authorization");
                granted
            }
            Err(e) => {
                warn!(error = %e, "health store authorization failed");
                false
            }
        }
    }

    /// Fetch changes since `cursor` within `window` ending at `now`.
    pub async fn pull(
        &self,
        cursor: Option<&SyncCursor>,
        window: RetentionWindow,
        now: Timestamp,
    ) -> Result<PullResult> {
        if !self.health.is_available() {
            return Err(SyncError::Unavailable);
        }
        if !self.is_authorized() {
            return Err(SyncError::NotAuthorized("reading samples"));
        }

        let result = self
            .health
            .query(AnchoredQuery {
                sample_type: SampleType::DietaryWater,
                range: TimeRange {
                    start: window.start(now),
                    end: now,
                },
                anchor: cursor.cloned(),
            })
            .await?;

        let local = self.health.local_source();
        let mut skipped = 0;
        let new_records: Vec<Record> = result
            .samples
            .iter()
            .filter(|s| s.source != local)
            .filter_map(|s| match sample_to_record(s) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(sample = %s.uuid, error = %e, "skipping invalid sample");
                    skipped += 1;
                    None
                }
            })
            .collect();

        let deleted: Vec<DeletedRef> = result
            .deletions
            .iter()
            .map(DeletedRef::from_object)
            .collect();

        debug!(
            added = new_records.len(),
            deleted = deleted.len(),
            skipped,
            "pulled changes"
        );

        Ok(PullResult {
            new_records,
            deleted,
            new_cursor: result.new_anchor,
            skipped,
        })
    }

    /// Write one record to the external store.
    pub async fn push(&self, record: &Record) -> Result<()> {
        if !self.health.is_available() {
            return Err(SyncError::Unavailable);
        }
        if self.health.sharing_status(SampleType::DietaryWater)
            != AuthorizationStatus::SharingAuthorized
        {
            return Err(SyncError::NotAuthorized("sharing samples"));
        }

        let sample = QuantitySample {
            uuid: RecordId::generate(),
            sample_type: SampleType::DietaryWater,
            quantity_ml: record.amount(),
            start: record.timestamp(),
            end: record.timestamp(),
            source: self.health.local_source(),
            metadata: SampleMetadata {
                sync_identifier: Some(record.id().to_string()),
                sync_version: Some(SCHEMA_VERSION),
            },
        };

        self.health.save(sample).await?;
        debug!(record_id = %record.id(), amount = record.amount(), "pushed record");
        Ok(())
    }
}

/// External samples keep the store's identifier as their record id.
fn sample_to_record(sample: &QuantitySample) -> Result<Record> {
    Ok(Record::with_id(
        sample.quantity_ml,
        sample.start,
        sample.uuid,
    )?)
}

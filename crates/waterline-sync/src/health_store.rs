//! External health-store abstraction.
//!
//! The health store is the authoritative record of intake samples shared
//! between applications. Waterline never reimplements its storage or query
//! engine; it only talks to it through [`HealthStore`]. Platform bindings
//! implement the trait, and [`memory::MemoryHealthStore`] stands in for tests
//! and demos.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use waterline_core::{RecordId, Timestamp};
use waterline_store::SyncCursor;

use crate::error::Result;

/// Version marker written into the metadata of every pushed sample.
pub const SCHEMA_VERSION: u32 = 1;

/// Sample kinds Waterline reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    DietaryWater,
}

impl SampleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::DietaryWater => "dietary water",
        }
    }
}

/// Whether this application may write a sample type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    NotDetermined,
    SharingDenied,
    SharingAuthorized,
}

/// Identity of the application that wrote a sample.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Writer-supplied metadata attached to a sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// The writer's own identifier for the sample.
    pub sync_identifier: Option<String>,
    /// Schema version of the writer.
    pub sync_version: Option<u32>,
}

/// One quantity sample in the external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantitySample {
    /// The store's own identifier for the sample.
    pub uuid: RecordId,
    pub sample_type: SampleType,
    pub quantity_ml: f64,
    pub start: Timestamp,
    pub end: Timestamp,
    pub source: SourceId,
    pub metadata: SampleMetadata,
}

/// A sample that was removed from the external store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedObject {
    pub uuid: RecordId,
    pub metadata: SampleMetadata,
}

/// Closed time range. A sample matches only if it starts and ends inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn contains(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start <= start && end <= self.end
    }
}

/// Query for changes since an anchor.
#[derive(Debug, Clone)]
pub struct AnchoredQuery {
    pub sample_type: SampleType,
    pub range: TimeRange,
    /// `None` asks for everything currently in range.
    pub anchor: Option<SyncCursor>,
}

/// Changes since the query's anchor.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub samples: Vec<QuantitySample>,
    pub deletions: Vec<DeletedObject>,
    /// Anchor to pass to the next query.
    pub new_anchor: SyncCursor,
}

/// Interface to the external health-record store.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Whether the store exists on this device at all.
    fn is_available(&self) -> bool;

    /// Ask for share/read access. Returns whether access was granted.
    async fn request_authorization(&self, share: &[SampleType], read: &[SampleType])
        -> Result<bool>;

    /// Current write permission for a sample type.
    fn sharing_status(&self, sample_type: SampleType) -> AuthorizationStatus;

    /// The source identity samples written by this application carry.
    fn local_source(&self) -> SourceId;

    /// Fetch additions and deletions since `query.anchor`.
    async fn query(&self, query: AnchoredQuery) -> Result<QueryResult>;

    /// Write one sample.
    async fn save(&self, sample: QuantitySample) -> Result<()>;
}

#[async_trait]
impl<H: HealthStore + ?Sized> HealthStore for std::sync::Arc<H> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    async fn request_authorization(
        &self,
        share: &[SampleType],
        read: &[SampleType],
    ) -> Result<bool> {
        (**self).request_authorization(share, read).await
    }

    fn sharing_status(&self, sample_type: SampleType) -> AuthorizationStatus {
        (**self).sharing_status(sample_type)
    }

    fn local_source(&self) -> SourceId {
        (**self).local_source()
    }

    async fn query(&self, query: AnchoredQuery) -> Result<QueryResult> {
        (**self).query(query).await
    }

    async fn save(&self, sample: QuantitySample) -> Result<()> {
        (**self).save(sample).await
    }
}

/// A complete in-memory health store for tests and demos.
///
/// Every insertion and deletion bumps a monotonic change counter; anchors
/// are that counter encoded as 8 big-endian bytes.
pub mod memory {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    use tokio::sync::watch;

    use crate::error::SyncError;

    #[derive(Debug, Clone)]
    struct StoredSample {
        sample: QuantitySample,
        changed_at: u64,
    }

    #[derive(Debug, Clone)]
    struct Tombstone {
        object: DeletedObject,
        changed_at: u64,
    }

    struct State {
        available: bool,
        grant: bool,
        sharing: AuthorizationStatus,
        samples: Vec<StoredSample>,
        tombstones: Vec<Tombstone>,
        counter: u64,
        failing_queries: usize,
        failing_saves: usize,
        queries: usize,
        saves: usize,
    }

    /// In-memory health store implementation.
    pub struct MemoryHealthStore {
        source: SourceId,
        state: Mutex<State>,
        /// `true` while queries are held back.
        paused: watch::Sender<bool>,
    }

    impl MemoryHealthStore {
        /// Create an available store that grants access on request.
        pub fn new(source: SourceId) -> Self {
            let (paused, _) = watch::channel(false);
            Self {
                source,
                state: Mutex::new(State {
                    available: true,
                    grant: true,
                    sharing: AuthorizationStatus::NotDetermined,
                    samples: Vec::new(),
                    tombstones: Vec::new(),
                    counter: 0,
                    failing_queries: 0,
                    failing_saves: 0,
                    queries: 0,
                    saves: 0,
                }),
                paused,
            }
        }

        /// Create a store that reports itself as missing on this device.
        pub fn unavailable(source: SourceId) -> Self {
            let store = Self::new(source);
            store.state().available = false;
            store
        }

        /// Whether the next authorization request is granted.
        pub fn set_grant(&self, grant: bool) {
            self.state().grant = grant;
        }

        /// Override the sharing status directly.
        pub fn set_sharing_status(&self, status: AuthorizationStatus) {
            self.state().sharing = status;
        }

        /// Make the next `n` queries fail.
        pub fn fail_next_queries(&self, n: usize) {
            self.state().failing_queries = n;
        }

        /// Make the next `n` saves fail.
        pub fn fail_next_saves(&self, n: usize) {
            self.state().failing_saves = n;
        }

        /// Hold every query until [`resume_queries`](Self::resume_queries).
        pub fn pause_queries(&self) {
            self.paused.send_replace(true);
        }

        pub fn resume_queries(&self) {
            self.paused.send_replace(false);
        }

        /// Insert a sample written by another application.
        pub fn insert_from(
            &self,
            source: SourceId,
            quantity_ml: f64,
            at: Timestamp,
            metadata: SampleMetadata,
        ) -> RecordId {
            let uuid = RecordId::generate();
            self.insert(QuantitySample {
                uuid,
                sample_type: SampleType::DietaryWater,
                quantity_ml,
                start: at,
                end: at,
                source,
                metadata,
            });
            uuid
        }

        /// Insert a sample as-is.
        pub fn insert(&self, sample: QuantitySample) {
            let mut state = self.state();
            state.counter += 1;
            let changed_at = state.counter;
            state.samples.retain(|s| s.sample.uuid != sample.uuid);
            state.samples.push(StoredSample { sample, changed_at });
        }

        /// Delete a sample by its store identifier. Returns whether it existed.
        pub fn delete(&self, uuid: RecordId) -> bool {
            let mut state = self.state();
            let Some(pos) = state.samples.iter().position(|s| s.sample.uuid == uuid) else {
                return false;
            };
            let removed = state.samples.remove(pos);
            state.counter += 1;
            let changed_at = state.counter;
            state.tombstones.push(Tombstone {
                object: DeletedObject {
                    uuid,
                    metadata: removed.sample.metadata,
                },
                changed_at,
            });
            true
        }

        /// Delete the sample whose sync identifier names `record_id`.
        pub fn delete_synced(&self, record_id: RecordId) -> bool {
            let wanted = record_id.to_string();
            let uuid = self.state().samples.iter().find_map(|s| {
                (s.sample.metadata.sync_identifier.as_deref() == Some(wanted.as_str()))
                    .then_some(s.sample.uuid)
            });
            uuid.map_or(false, |uuid| self.delete(uuid))
        }

        /// All samples currently stored.
        pub fn samples(&self) -> Vec<QuantitySample> {
            self.state()
                .samples
                .iter()
                .map(|s| s.sample.clone())
                .collect()
        }

        /// Number of queries answered or failed so far.
        pub fn query_count(&self) -> usize {
            self.state().queries
        }

        /// Number of successful saves so far.
        pub fn save_count(&self) -> usize {
            self.state().saves
        }

        fn state(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    fn decode_anchor(anchor: &SyncCursor) -> Result<u64> {
        let bytes: [u8; 8] = anchor
            .as_bytes()
            .try_into()
            .map_err(|_| SyncError::MalformedAnchor(format!("{:?}", anchor)))?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn encode_anchor(counter: u64) -> SyncCursor {
        SyncCursor::from(counter.to_be_bytes().to_vec())
    }

    #[async_trait]
    impl HealthStore for MemoryHealthStore {
        fn is_available(&self) -> bool {
            self.state().available
        }

        async fn request_authorization(
            &self,
            _share: &[SampleType],
            _read: &[SampleType],
        ) -> Result<bool> {
            let mut state = self.state();
            if !state.available {
                return Err(SyncError::Unavailable);
            }
            state.sharing = if state.grant {
                AuthorizationStatus::SharingAuthorized
            } else {
                AuthorizationStatus::SharingDenied
            };
            Ok(state.grant)
        }

        fn sharing_status(&self, _sample_type: SampleType) -> AuthorizationStatus {
            self.state().sharing
        }

        fn local_source(&self) -> SourceId {
            self.source.clone()
        }

        async fn query(&self, query: AnchoredQuery) -> Result<QueryResult> {
            let mut paused = self.paused.subscribe();
            // The sender lives in self, so the channel cannot close here.
            let _ = paused.wait_for(|held| !*held).await;

            let since = query.anchor.as_ref().map(decode_anchor).transpose()?;

            let mut state = self.state();
            state.queries += 1;
            if state.failing_queries > 0 {
                state.failing_queries -= 1;
                return Err(SyncError::Query("injected query failure".into()));
            }

            let after = since.unwrap_or(0);
            let samples = state
                .samples
                .iter()
                .filter(|s| s.changed_at > after)
                .filter(|s| s.sample.sample_type == query.sample_type)
                .filter(|s| query.range.contains(s.sample.start, s.sample.end))
                .map(|s| s.sample.clone())
                .collect();

            // A fresh query has nothing to reconcile deletions against.
            let deletions = match since {
                Some(after) => state
                    .tombstones
                    .iter()
                    .filter(|t| t.changed_at > after)
                    .map(|t| t.object.clone())
                    .collect(),
                None => Vec::new(),
            };

            Ok(QueryResult {
                samples,
                deletions,
                new_anchor: encode_anchor(state.counter),
            })
        }

        async fn save(&self, mut sample: QuantitySample) -> Result<()> {
            {
                let mut state = self.state();
                if !state.available {
                    return Err(SyncError::Unavailable);
                }
                if state.failing_saves > 0 {
                    state.failing_saves -= 1;
                    return Err(SyncError::Write("injected write failure".into()));
                }
                state.saves += 1;
            }
            sample.source = self.source.clone();
            self.insert(sample);
            Ok(())
        }
    }
}

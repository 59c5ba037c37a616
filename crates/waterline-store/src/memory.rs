//! In-memory implementation of the PersistenceStore trait.
//!
//! This is primarily for testing. It has the same semantics as the file
//! store (dirty check, absent-is-empty, independent cursor) and also counts
//! physical writes and can inject failures.

use std::sync::RwLock;

use async_trait::async_trait;
use waterline_core::Record;

use crate::cancel::CancelToken;
use crate::cursor::SyncCursor;
use crate::error::{Result, StoreError};
use crate::traits::{PersistenceStore, SaveOutcome};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// The "durable" record set. `None` means nothing was ever written.
    records: Option<Vec<Record>>,

    /// Last set known to be durable, for the dirty check.
    saved: Option<Vec<Record>>,

    /// The "durable" cursor.
    cursor: Option<SyncCursor>,

    /// Number of physical record writes.
    writes: usize,

    /// Fail this many upcoming record saves.
    failing_saves: usize,

    /// Report the record set as undecodable.
    corrupt: bool,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Create a store that already holds `records`, as if written earlier.
    pub fn with_records(records: Vec<Record>) -> Self {
        let store = Self::new();
        store.write_inner().records = Some(records);
        store
    }

    /// Create a store whose record set fails to decode on load.
    pub fn corrupted() -> Self {
        let store = Self::new();
        store.write_inner().corrupt = true;
        store
    }

    /// Seed the durable cursor.
    pub fn set_cursor(&self, cursor: Option<SyncCursor>) {
        self.write_inner().cursor = cursor;
    }

    /// Make the next `n` record saves fail with an I/O error.
    pub fn fail_next_saves(&self, n: usize) {
        self.write_inner().failing_saves = n;
    }

    /// Number of physical record writes so far.
    pub fn write_count(&self) -> usize {
        self.read_inner().writes
    }

    /// The record set as last durably written.
    pub fn durable_records(&self) -> Option<Vec<Record>> {
        self.read_inner().records.clone()
    }

    /// The cursor as last durably written.
    pub fn durable_cursor(&self) -> Option<SyncCursor> {
        self.read_inner().cursor.clone()
    }

    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn load(&self) -> Result<Vec<Record>> {
        let mut inner = self.write_inner();

        if inner.corrupt {
            return Err(StoreError::Serialization(
                "records file is corrupt".into(),
            ));
        }

        let records = inner.records.clone().unwrap_or_default();
        inner.saved = Some(records.clone());
        Ok(records)
    }

    async fn save(&self, records: &[Record], cancel: &CancelToken) -> Result<SaveOutcome> {
        let mut inner = self.write_inner();

        if inner.saved.as_deref() == Some(records) {
            return Ok(SaveOutcome::Skipped);
        }

        cancel.check()?;

        if inner.failing_saves > 0 {
            inner.failing_saves -= 1;
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            )));
        }

        let bytes = crate::migration::encode(records).len();
        inner.records = Some(records.to_vec());
        inner.saved = Some(records.to_vec());
        inner.writes += 1;
        Ok(SaveOutcome::Written { bytes })
    }

    async fn load_cursor(&self) -> Result<Option<SyncCursor>> {
        Ok(self.read_inner().cursor.clone())
    }

    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        self.write_inner().cursor = Some(cursor.clone());
        Ok(())
    }
}

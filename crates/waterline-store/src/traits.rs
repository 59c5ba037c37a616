//! PersistenceStore trait: the abstract interface for durable state.
//!
//! This trait allows the engine to be storage-agnostic. Implementations
//! include atomic files (primary) and in-memory (for tests).

use std::sync::Arc;

use async_trait::async_trait;
use waterline_core::Record;

use crate::cancel::CancelToken;
use crate::cursor::SyncCursor;
use crate::error::Result;

/// Result of saving a record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The set was durably written.
    Written {
        /// Size of the file that replaced the previous one.
        bytes: usize,
    },
    /// The set equals the last durable state; nothing was written.
    Skipped,
}

impl SaveOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SaveOutcome::Written { .. })
    }
}

/// The PersistenceStore trait: async interface for durable state.
///
/// All methods are async so blocking backends can move their I/O off the
/// caller's task (`spawn_blocking`). A method returns only once its bytes
/// are durable, or once it has failed without corrupting the prior file.
///
/// # Design Notes
///
/// - **Absent is empty**: `load` on a fresh store returns an empty set.
/// - **Dirty check**: `save` compares against the last durable state by value
///   and skips the write when nothing changed. A failed save leaves that
///   state stale so the next attempt rewrites everything.
/// - **Atomic replace**: partial writes are never observable.
/// - **Independent cursor**: cursor reads and writes never touch the records.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Record Set
    // ─────────────────────────────────────────────────────────────────────────

    /// Load the durable record set.
    ///
    /// Also seeds the dirty check with what was loaded.
    async fn load(&self) -> Result<Vec<Record>>;

    /// Durably replace the record set.
    ///
    /// `cancel` is checked before each blocking step.
    async fn save(&self, records: &[Record], cancel: &CancelToken) -> Result<SaveOutcome>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Cursor
    // ─────────────────────────────────────────────────────────────────────────

    /// Load the sync cursor, `None` if none was ever saved.
    async fn load_cursor(&self) -> Result<Option<SyncCursor>>;

    /// Durably replace the sync cursor.
    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<()>;
}

#[async_trait]
impl<S: PersistenceStore + ?Sized> PersistenceStore for Arc<S> {
    async fn load(&self) -> Result<Vec<Record>> {
        (**self).load().await
    }

    async fn save(&self, records: &[Record], cancel: &CancelToken) -> Result<SaveOutcome> {
        (**self).save(records, cancel).await
    }

    async fn load_cursor(&self) -> Result<Option<SyncCursor>> {
        (**self).load_cursor().await
    }

    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        (**self).save_cursor(cursor).await
    }
}

//! File-based implementation of the PersistenceStore trait.
//!
//! This is the primary storage backend. Each piece of state lives in its own
//! file inside a data directory and is replaced atomically: the bytes go to
//! a temp file in the same directory, are fsynced, and the temp file is
//! renamed over the target. Blocking I/O runs on `spawn_blocking`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use waterline_core::Record;

use crate::cancel::CancelToken;
use crate::cursor::SyncCursor;
use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{PersistenceStore, SaveOutcome};

/// Default records file name.
pub const RECORDS_FILE: &str = "records.cbor";

/// Default cursor file name.
pub const CURSOR_FILE: &str = "sync-cursor.bin";

/// Atomic file-based store.
///
/// Thread-safe: the last-saved snapshot sits behind a mutex that is only
/// held for the equality check and the final update.
pub struct FileStore {
    dir: PathBuf,
    records_path: PathBuf,
    cursor_path: PathBuf,
    /// Last record set known to be durable.
    saved: Arc<Mutex<Option<Vec<Record>>>>,
}

impl FileStore {
    /// Open a store in `dir` with the default file names.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_file_names(dir, RECORDS_FILE, CURSOR_FILE)
    }

    /// Open a store with explicit file names.
    pub fn with_file_names(
        dir: impl AsRef<Path>,
        records_file: &str,
        cursor_file: &str,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            records_path: dir.join(records_file),
            cursor_path: dir.join(cursor_file),
            dir,
            saved: Arc::new(Mutex::new(None)),
        })
    }

    pub fn records_path(&self) -> &Path {
        &self.records_path
    }

    pub fn cursor_path(&self) -> &Path {
        &self.cursor_path
    }
}

#[async_trait]
impl PersistenceStore for FileStore {
    async fn load(&self) -> Result<Vec<Record>> {
        let path = self.records_path.clone();
        let saved = Arc::clone(&self.saved);

        run_blocking(move || {
            let records = match std::fs::read(&path) {
                Ok(bytes) => migration::decode(&bytes)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "no records file, starting empty");
                    Vec::new()
                }
                Err(e) => return Err(e.into()),
            };

            *lock(&*saved)? = Some(records.clone());
            debug!(count = records.len(), "loaded records");
            Ok(records)
        })
        .await
    }

    async fn save(&self, records: &[Record], cancel: &CancelToken) -> Result<SaveOutcome> {
        let records = records.to_vec();
        let dir = self.dir.clone();
        let path = self.records_path.clone();
        let saved = Arc::clone(&self.saved);
        let cancel = cancel.clone();

        run_blocking(move || {
            if lock(&*saved)?.as_deref() == Some(records.as_slice()) {
                return Ok(SaveOutcome::Skipped);
            }

            cancel.check()?;
            let bytes = migration::encode(&records);
            write_atomic(&dir, &path, &bytes, &cancel)?;

            *lock(&*saved)? = Some(records);
            Ok(SaveOutcome::Written { bytes: bytes.len() })
        })
        .await
    }

    async fn load_cursor(&self) -> Result<Option<SyncCursor>> {
        let path = self.cursor_path.clone();

        run_blocking(move || match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(SyncCursor::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        let bytes = cursor.as_bytes().to_vec();
        let dir = self.dir.clone();
        let path = self.cursor_path.clone();

        run_blocking(move || write_atomic(&dir, &path, &bytes, &CancelToken::new())).await
    }
}

/// Write `bytes` to `path` via temp file + fsync + rename.
///
/// The prior file stays intact unless the final rename succeeds.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8], cancel: &CancelToken) -> Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;

    cancel.check()?;
    temp.as_file().sync_all()?;

    cancel.check()?;
    temp.persist(path).map_err(|e| StoreError::Io(e.error))?;

    sync_dir(dir);
    Ok(())
}

/// Make the rename itself durable. Best effort: not every platform lets a
/// directory be opened for syncing.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        match std::fs::File::open(dir) {
            Ok(handle) => {
                if let Err(e) = handle.sync_all() {
                    warn!(error = %e, "directory fsync failed");
                }
            }
            Err(e) => warn!(error = %e, "could not open data directory for fsync"),
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| StoreError::Poisoned(e.to_string()))
}

async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

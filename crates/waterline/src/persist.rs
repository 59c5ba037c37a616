//! The persistence worker.
//!
//! A single task performs every durable write in the order it was enqueued,
//! so a newer record set can never be overwritten by an older one. Callers
//! either fire a save and move on (foreground) or wait for it to be durable
//! (background, where the process may be suspended right after).

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use waterline_core::Record;
use waterline_store::{CancelToken, PersistenceStore, SaveOutcome, StoreError, SyncCursor};

/// Whether the host application is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Saves are enqueued and the caller continues.
    #[default]
    Foreground,
    /// Saves complete before the caller gets its reply.
    Background,
}

type SaveReply = oneshot::Sender<Result<SaveOutcome, StoreError>>;

enum Job {
    Records {
        records: Arc<[Record]>,
        ack: Option<SaveReply>,
    },
    Cursor(SyncCursor),
}

/// Sending side of the persistence worker.
pub(crate) struct Persister {
    jobs: mpsc::UnboundedSender<Job>,
    cancel: CancelToken,
}

impl Persister {
    /// Spawn the worker.
    pub(crate) fn spawn<S>(store: Arc<S>, cancel: CancelToken) -> (Self, JoinHandle<()>)
    where
        S: PersistenceStore + 'static,
    {
        let (jobs, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(store, rx, cancel.clone()));
        (Self { jobs, cancel }, worker)
    }

    /// Enqueue a record save without waiting for it.
    pub(crate) fn enqueue(&self, records: Arc<[Record]>) {
        if self.jobs.send(Job::Records { records, ack: None }).is_err() {
            warn!("persistence worker stopped, dropping save");
        }
    }

    /// Enqueue a record save and wait until it is durable or has failed.
    pub(crate) async fn save(&self, records: Arc<[Record]>) -> Result<SaveOutcome, StoreError> {
        let (ack, done) = oneshot::channel();
        self.jobs
            .send(Job::Records {
                records,
                ack: Some(ack),
            })
            .map_err(|_| StoreError::Task("persistence worker stopped".into()))?;
        done.await
            .map_err(|_| StoreError::Task("persistence worker dropped the save".into()))?
    }

    /// Save according to the lifecycle. Errors are logged by the worker.
    pub(crate) async fn save_for(&self, lifecycle: LifecycleState, records: Arc<[Record]>) {
        match lifecycle {
            LifecycleState::Foreground => self.enqueue(records),
            LifecycleState::Background => {
                let _ = self.save(records).await;
            }
        }
    }

    /// Enqueue a cursor write. It lands before any records enqueued later.
    pub(crate) fn enqueue_cursor(&self, cursor: SyncCursor) {
        if self.jobs.send(Job::Cursor(cursor)).is_err() {
            warn!("persistence worker stopped, dropping cursor");
        }
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

async fn run<S: PersistenceStore>(
    store: Arc<S>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    cancel: CancelToken,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Records { records, ack } => {
                let result = store.save(&records, &cancel).await;
                // A cancellation covers one save, whatever its outcome.
                cancel.reset();
                match &result {
                    Ok(SaveOutcome::Written { bytes }) => {
                        debug!(count = records.len(), bytes, "records saved");
                    }
                    Ok(SaveOutcome::Skipped) => debug!("records unchanged, save skipped"),
                    Err(StoreError::Cancelled) => warn!("records save cancelled"),
                    Err(e) => warn!(error = %e, "records save failed"),
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
            Job::Cursor(cursor) => {
                if let Err(e) = store.save_cursor(&cursor).await {
                    warn!(error = %e, "sync cursor save failed");
                }
            }
        }
    }
    debug!("persistence worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use waterline_core::Timestamp;
    use waterline_store::MemoryStore;

    fn records(amounts: &[f64]) -> Arc<[Record]> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| Record::new(*a, Timestamp(i as i64)).unwrap())
            .collect::<Vec<_>>()
            .into()
    }

    #[tokio::test]
    async fn test_saves_land_in_order() {
        let store = Arc::new(MemoryStore::new());
        let (persister, worker) = Persister::spawn(Arc::clone(&store), CancelToken::new());

        let first = records(&[100.0]);
        let second = records(&[100.0, 200.0]);
        persister.enqueue(Arc::clone(&first));
        persister.enqueue(Arc::clone(&second));
        persister.save(Arc::clone(&second)).await.unwrap();

        assert_eq!(store.durable_records().unwrap(), second.to_vec());
        assert_eq!(store.write_count(), 2);

        drop(persister);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_background_save_reports_failure() {
        let store = Arc::new(MemoryStore::new());
        let (persister, _worker) = Persister::spawn(Arc::clone(&store), CancelToken::new());

        store.fail_next_saves(1);
        assert!(persister.save(records(&[1.0])).await.is_err());
        assert!(persister.save(records(&[1.0])).await.unwrap().is_written());
    }

    #[tokio::test]
    async fn test_cancel_applies_to_one_save() {
        let store = Arc::new(MemoryStore::new());
        let (persister, _worker) = Persister::spawn(Arc::clone(&store), CancelToken::new());

        persister.cancel_token().cancel();
        assert!(matches!(
            persister.save(records(&[1.0])).await,
            Err(StoreError::Cancelled)
        ));
        assert!(persister.save(records(&[1.0])).await.unwrap().is_written());
    }

    #[tokio::test]
    async fn test_cancel_lapses_after_skipped_save() {
        let store = Arc::new(MemoryStore::new());
        let (persister, _worker) = Persister::spawn(Arc::clone(&store), CancelToken::new());
        let saved = records(&[1.0]);
        persister.save(Arc::clone(&saved)).await.unwrap();

        persister.cancel_token().cancel();
        assert_eq!(persister.save(saved).await.unwrap(), SaveOutcome::Skipped);
        assert!(persister.save(records(&[2.0])).await.unwrap().is_written());
    }

    #[tokio::test]
    async fn test_cursor_is_written() {
        let store = Arc::new(MemoryStore::new());
        let (persister, worker) = Persister::spawn(Arc::clone(&store), CancelToken::new());

        persister.enqueue_cursor(SyncCursor::from(vec![7]));
        drop(persister);
        worker.await.unwrap();

        assert_eq!(store.durable_cursor(), Some(SyncCursor::from(vec![7])));
    }
}

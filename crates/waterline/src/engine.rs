//! The reconciliation engine.
//!
//! One coordination task owns the record set, the sync cursor, the
//! authorization state and the push retry queue. Everything else talks to
//! it through an [`EngineHandle`]: commands go in over a bounded channel,
//! replies come back on oneshots, and every mutation publishes a new
//! [`Snapshot`] on a watch channel.
//!
//! Pulls and pushes run as spawned tasks and report back as events, so a
//! slow external store never blocks local additions.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use waterline_core::{sort_by_time, Clock, Record, RecordId, RetentionWindow, Timestamp};
use waterline_store::{CancelToken, PersistenceStore, SaveOutcome, SyncCursor};
use waterline_sync::{HealthStore, PullResult, SyncAdapter, SyncError};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::persist::{LifecycleState, Persister};
use crate::snapshot::Snapshot;

/// Entry point: hydrates state and spawns the coordination task.
pub struct Engine;

impl Engine {
    /// Load persisted state and start the engine.
    ///
    /// A records file that exists but cannot be read is fatal. A cursor that
    /// cannot be read is logged and treated as absent.
    pub async fn start<S, H, C>(
        config: EngineConfig,
        store: S,
        health: H,
        clock: C,
    ) -> Result<EngineHandle>
    where
        S: PersistenceStore + 'static,
        H: HealthStore + 'static,
        C: Clock + 'static,
    {
        config.validate()?;
        let store = Arc::new(store);

        let mut records = dedupe_by_id(store.load().await?);
        let cursor = match store.load_cursor().await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(error = %e, "could not read sync cursor, starting without one");
                None
            }
        };

        let window = config.sync.window();
        let now = clock.now();
        sort_by_time(&mut records);
        let records = window.apply(&records, now);
        info!(
            count = records.len(),
            has_cursor = cursor.is_some(),
            "engine hydrated"
        );

        let snapshot = Snapshot::new(records.clone().into(), 0, config.aggregate);
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);
        let (persister, persist_worker) = Persister::spawn(store, CancelToken::new());
        let cancel = persister.cancel_token();

        let (commands, command_rx) = mpsc::channel(config.command_queue_depth);
        let (events, event_rx) = mpsc::unbounded_channel();

        let config = Arc::new(config);
        let mut coordinator = Coordinator {
            config: Arc::clone(&config),
            window,
            clock: Arc::new(clock),
            adapter: Arc::new(SyncAdapter::new(health)),
            records,
            cursor,
            version: 0,
            lifecycle: LifecycleState::default(),
            snapshot_tx,
            persister,
            persist_worker: Some(persist_worker),
            pull: PullState::Idle,
            retries: RetryQueue::new(config.sync.push_retry_capacity),
            events,
        };

        // Hydration may have dropped expired records; persist that.
        coordinator.persist().await;
        if config.sync.sync_on_start {
            coordinator.start_pull(Vec::new());
        }

        tokio::spawn(coordinator.run(command_rx, event_rx));

        Ok(EngineHandle {
            commands,
            snapshots: snapshot_rx,
            cancel,
            config,
        })
    }
}

/// Cheap, cloneable access to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    cancel: CancelToken,
    config: Arc<EngineConfig>,
}

impl EngineHandle {
    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a local intake event.
    ///
    /// The record is published and persisted, then pushed to the external
    /// store in the background. A record outside the retention window is
    /// still returned and pushed but does not stay in the set.
    pub async fn add_local_record(&self, amount: f64, timestamp: Timestamp) -> Result<Record> {
        self.request(|reply| Command::AddLocal {
            amount,
            timestamp,
            reply,
        })
        .await?
    }

    /// Pull changes from the external store and merge them.
    ///
    /// Returns `false` if the store is unavailable, access is not granted,
    /// the pull failed or the engine is shut down. A failed pull changes
    /// nothing.
    pub async fn sync_from_external(&self) -> bool {
        self.request(|reply| Command::Sync { reply })
            .await
            .unwrap_or(false)
    }

    /// Choose how saves are executed. Returns the previous state.
    pub async fn set_lifecycle(&self, state: LifecycleState) -> Result<LifecycleState> {
        self.request(|reply| Command::SetLifecycle { state, reply })
            .await
    }

    /// Persist the current record set and wait until it is durable.
    pub async fn flush(&self) -> Result<SaveOutcome> {
        self.request(|reply| Command::Flush { reply }).await?
    }

    /// Stop the engine after finishing queued commands and saves.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cancel the save in progress, or the next one if none is running.
    ///
    /// For hosts whose background time is about to expire. The request
    /// lapses after that one save, whatever its outcome, and when the engine
    /// returns to the foreground.
    pub fn cancel_pending_save(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| EngineError::Closed)?;
        response.await.map_err(|_| EngineError::Closed)
    }
}

enum Command {
    AddLocal {
        amount: f64,
        timestamp: Timestamp,
        reply: oneshot::Sender<Result<Record>>,
    },
    Sync {
        reply: oneshot::Sender<bool>,
    },
    SetLifecycle {
        state: LifecycleState,
        reply: oneshot::Sender<LifecycleState>,
    },
    Flush {
        reply: oneshot::Sender<Result<SaveOutcome>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Reports from spawned tasks.
enum Event {
    PullCompleted(std::result::Result<PullResult, SyncError>),
    PushFailed(Record),
}

enum PullState {
    Idle,
    InFlight {
        /// Callers answered by the running pull.
        waiters: Vec<oneshot::Sender<bool>>,
        /// Callers that arrived meanwhile; served by a follow-up pull.
        queued: Vec<oneshot::Sender<bool>>,
    },
}

/// Failed pushes awaiting another attempt. Oldest entries go first.
struct RetryQueue {
    capacity: usize,
    records: VecDeque<Record>,
}

impl RetryQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::new(),
        }
    }

    fn push(&mut self, record: Record) {
        if self.capacity == 0 {
            warn!(record_id = %record.id(), "push failed, retries disabled");
            return;
        }
        self.records.retain(|r| r.id() != record.id());
        if self.records.len() == self.capacity {
            if let Some(dropped) = self.records.pop_front() {
                warn!(record_id = %dropped.id(), "push retry queue full, dropping oldest");
            }
        }
        self.records.push_back(record);
    }

    fn remove(&mut self, id: RecordId) {
        self.records.retain(|r| r.id() != id);
    }

    fn take(&mut self) -> Vec<Record> {
        self.records.drain(..).collect()
    }
}

struct Coordinator<H: HealthStore, C: Clock> {
    config: Arc<EngineConfig>,
    window: RetentionWindow,
    clock: Arc<C>,
    adapter: Arc<SyncAdapter<H>>,
    records: Vec<Record>,
    cursor: Option<SyncCursor>,
    version: u64,
    lifecycle: LifecycleState,
    snapshot_tx: watch::Sender<Snapshot>,
    persister: Persister,
    persist_worker: Option<JoinHandle<()>>,
    pull: PullState,
    retries: RetryQueue,
    events: mpsc::UnboundedSender<Event>,
}

impl<H: HealthStore + 'static, C: Clock + 'static> Coordinator<H, C> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        let shutdown = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => break Some(reply),
                    Some(command) => self.handle_command(command).await,
                    // Every handle is gone.
                    None => break None,
                },
                Some(event) = events.recv() => self.handle_event(event).await,
            }
        };

        // Finish what was already queued, then let the in-flight pull land.
        commands.close();
        while let Some(command) = commands.recv().await {
            match command {
                Command::Sync { reply } => {
                    let _ = reply.send(false);
                }
                Command::Shutdown { reply } => {
                    let _ = reply.send(());
                }
                command => self.handle_command(command).await,
            }
        }
        if let PullState::InFlight { queued, .. } = &mut self.pull {
            for waiter in queued.drain(..) {
                let _ = waiter.send(false);
            }
            while let Some(event) = events.recv().await {
                let done = matches!(event, Event::PullCompleted(_));
                self.handle_event(event).await;
                if done {
                    break;
                }
            }
        }

        let Coordinator {
            persister,
            persist_worker,
            ..
        } = self;
        drop(persister);
        if let Some(worker) = persist_worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "persistence worker panicked");
            }
        }
        info!("engine stopped");

        if let Some(reply) = shutdown {
            let _ = reply.send(());
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddLocal {
                amount,
                timestamp,
                reply,
            } => {
                let result = self.add_local(amount, timestamp).await;
                let _ = reply.send(result);
            }
            Command::Sync { reply } => match &mut self.pull {
                PullState::Idle => self.start_pull(vec![reply]),
                PullState::InFlight { queued, .. } => {
                    debug!("pull in flight, queueing sync request");
                    queued.push(reply);
                }
            },
            Command::SetLifecycle { state, reply } => {
                debug!(?state, "lifecycle changed");
                let previous = std::mem::replace(&mut self.lifecycle, state);
                if state == LifecycleState::Foreground {
                    self.persister.cancel_token().reset();
                }
                let _ = reply.send(previous);
            }
            Command::Flush { reply } => {
                let records = self.snapshot_tx.borrow().shared_records();
                let result = self.persister.save(records).await.map_err(Into::into);
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::PullCompleted(result) => self.finish_pull(result).await,
            Event::PushFailed(record) => {
                if self.records.iter().any(|r| r.id() == record.id()) {
                    self.retries.push(record);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local Additions
    // ─────────────────────────────────────────────────────────────────────────

    async fn add_local(&mut self, amount: f64, timestamp: Timestamp) -> Result<Record> {
        let record = Record::new(amount, timestamp)?;
        debug!(record_id = %record.id(), amount, %timestamp, "adding local record");

        self.records.push(record.clone());
        self.normalize();
        self.publish();
        self.persist().await;
        self.spawn_push(record.clone());

        Ok(record)
    }

    fn spawn_push(&self, record: Record) {
        let adapter = Arc::clone(&self.adapter);
        let events = self.events.clone();
        tokio::spawn(async move {
            match adapter.push(&record).await {
                Ok(()) => {}
                Err(SyncError::Unavailable) => {
                    debug!(record_id = %record.id(), "health store unavailable, not pushing");
                }
                Err(e) => {
                    warn!(record_id = %record.id(), error = %e, "push failed");
                    let _ = events.send(Event::PushFailed(record));
                }
            }
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pulls
    // ─────────────────────────────────────────────────────────────────────────

    fn start_pull(&mut self, waiters: Vec<oneshot::Sender<bool>>) {
        self.pull = PullState::InFlight {
            waiters,
            queued: Vec::new(),
        };

        let adapter = Arc::clone(&self.adapter);
        let clock = Arc::clone(&self.clock);
        let cursor = self.cursor.clone();
        let window = self.window;
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = if !adapter.health().is_available() {
                Err(SyncError::Unavailable)
            } else if adapter.is_authorized() || adapter.authorize().await {
                adapter.pull(cursor.as_ref(), window, clock.now()).await
            } else {
                Err(SyncError::NotAuthorized("reading samples"))
            };
            let _ = events.send(Event::PullCompleted(result));
        });
    }

    async fn finish_pull(&mut self, result: std::result::Result<PullResult, SyncError>) {
        let (waiters, queued) = match std::mem::replace(&mut self.pull, PullState::Idle) {
            PullState::InFlight { waiters, queued } => (waiters, queued),
            PullState::Idle => (Vec::new(), Vec::new()),
        };

        let success = match result {
            Ok(pulled) => {
                self.apply_pull(pulled).await;
                true
            }
            Err(SyncError::Unavailable) => {
                debug!("health store unavailable, skipping sync");
                false
            }
            Err(e) => {
                warn!(error = %e, "pull failed");
                false
            }
        };

        for waiter in waiters {
            let _ = waiter.send(success);
        }
        if !queued.is_empty() {
            self.start_pull(queued);
        }
    }

    async fn apply_pull(&mut self, pulled: PullResult) {
        let PullResult {
            new_records,
            deleted,
            new_cursor,
            ..
        } = pulled;

        // Advance the cursor before merging; the write is ordered ahead of
        // the record save below.
        self.persister.enqueue_cursor(new_cursor.clone());
        self.cursor = Some(new_cursor);

        let before = self.records.len();
        for reference in &deleted {
            let target = reference.target();
            self.records.retain(|r| r.id() != target);
            self.retries.remove(target);
        }
        let removed = before - self.records.len();

        let added = new_records.len();
        for record in new_records {
            self.records.retain(|r| r.id() != record.id());
            self.records.push(record);
        }

        self.normalize();
        info!(added, deleted = removed, total = self.records.len(), "merged external changes");
        self.publish();
        self.persist().await;

        for record in self.retries.take() {
            if self.records.iter().any(|r| r.id() == record.id()) {
                debug!(record_id = %record.id(), "retrying push");
                self.spawn_push(record);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Publishing
    // ─────────────────────────────────────────────────────────────────────────

    /// Restore ordering and drop records outside the window.
    fn normalize(&mut self) {
        sort_by_time(&mut self.records);
        let now = self.clock.now();
        let window = self.window;
        self.records.retain(|r| window.contains(r.timestamp(), now));
    }

    fn publish(&mut self) {
        self.version += 1;
        let snapshot = Snapshot::new(
            self.records.clone().into(),
            self.version,
            self.config.aggregate,
        );
        self.snapshot_tx.send_replace(snapshot);
    }

    async fn persist(&self) {
        let records = self.snapshot_tx.borrow().shared_records();
        self.persister.save_for(self.lifecycle, records).await;
    }
}

/// Keep the last occurrence of each id.
fn dedupe_by_id(records: Vec<Record>) -> Vec<Record> {
    let total = records.len();
    let mut seen = HashSet::with_capacity(total);
    let mut unique: Vec<Record> = records
        .into_iter()
        .rev()
        .filter(|r| seen.insert(r.id()))
        .collect();
    unique.reverse();

    if unique.len() < total {
        warn!(
            dropped = total - unique.len(),
            "stored records repeat ids, keeping the last of each"
        );
    }
    unique
}

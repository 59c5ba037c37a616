//! Background task handling and refresh scheduling.
//!
//! A suspended host wakes the engine through short-lived background tasks.
//! Each task must be completed exactly once, reporting whether the visible
//! state changed so the host can refresh its snapshot image.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::EngineHandle;
use crate::error::Result;
use crate::persist::LifecycleState;

/// How a background task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskResult {
    /// Whether the host should capture a new snapshot image.
    pub snapshot: bool,
    /// Whether the host returned its UI to the default state.
    pub restored_default_state: bool,
}

impl TaskResult {
    pub fn with_snapshot(snapshot: bool) -> Self {
        Self {
            snapshot,
            restored_default_state: false,
        }
    }
}

/// Completion slot of one background task.
///
/// Dropping an uncompleted task reports `snapshot = false` so the host is
/// never left waiting.
#[derive(Debug)]
pub struct TaskCompletion {
    tx: Option<oneshot::Sender<TaskResult>>,
}

impl TaskCompletion {
    /// A completion slot and the receiver the host waits on.
    pub fn new() -> (Self, oneshot::Receiver<TaskResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn complete(mut self, result: TaskResult) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(result);
        }
    }
}

impl Drop for TaskCompletion {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(TaskResult::default());
        }
    }
}

/// The kinds of background task a host can deliver.
#[derive(Debug)]
pub enum BackgroundTask {
    /// Time to refresh data from the external store.
    AppRefresh(TaskCompletion),
    /// The host wants an up-to-date snapshot image.
    Snapshot(TaskCompletion),
    Connectivity(TaskCompletion),
    UrlSession(TaskCompletion),
    RelevantShortcut(TaskCompletion),
    IntentDidRun(TaskCompletion),
}

impl BackgroundTask {
    pub fn kind(&self) -> &'static str {
        match self {
            BackgroundTask::AppRefresh(_) => "app_refresh",
            BackgroundTask::Snapshot(_) => "snapshot",
            BackgroundTask::Connectivity(_) => "connectivity",
            BackgroundTask::UrlSession(_) => "url_session",
            BackgroundTask::RelevantShortcut(_) => "relevant_shortcut",
            BackgroundTask::IntentDidRun(_) => "intent_did_run",
        }
    }
}

/// Asks the host platform to deliver the next app refresh task.
#[async_trait]
pub trait RefreshScheduler: Send + Sync {
    /// Request a refresh roughly `delay` from now.
    async fn schedule_refresh(&self, delay: Duration) -> Result<()>;
}

/// Complete every delivered task.
///
/// An app refresh switches to background saves, pulls, flushes, restores
/// the previous lifecycle, and on success schedules the next refresh. The
/// other kinds carry no work.
pub async fn handle_background_tasks<R>(
    engine: &EngineHandle,
    scheduler: &R,
    tasks: Vec<BackgroundTask>,
) where
    R: RefreshScheduler + ?Sized,
{
    for task in tasks {
        debug!(kind = task.kind(), "handling background task");
        match task {
            BackgroundTask::AppRefresh(completion) => {
                let success = app_refresh(engine, scheduler).await;
                completion.complete(TaskResult::with_snapshot(success));
            }
            BackgroundTask::Snapshot(completion) => completion.complete(TaskResult {
                snapshot: false,
                restored_default_state: true,
            }),
            BackgroundTask::Connectivity(completion)
            | BackgroundTask::UrlSession(completion)
            | BackgroundTask::RelevantShortcut(completion)
            | BackgroundTask::IntentDidRun(completion) => {
                completion.complete(TaskResult::with_snapshot(false))
            }
        }
    }
}

async fn app_refresh<R: RefreshScheduler + ?Sized>(engine: &EngineHandle, scheduler: &R) -> bool {
    let previous = match engine.set_lifecycle(LifecycleState::Background).await {
        Ok(previous) => previous,
        Err(e) => {
            warn!(error = %e, "engine unavailable for refresh");
            return false;
        }
    };

    let success = engine.sync_from_external().await;
    if let Err(e) = engine.flush().await {
        warn!(error = %e, "flush after refresh failed");
    }
    if let Err(e) = engine.set_lifecycle(previous).await {
        warn!(error = %e, "could not restore lifecycle after refresh");
    }

    if success {
        let delay = engine.config().refresh_interval;
        match scheduler.schedule_refresh(delay).await {
            Ok(()) => debug!(delay_secs = delay.as_secs(), "next refresh scheduled"),
            Err(e) => warn!(error = %e, "could not schedule next refresh"),
        }
    }
    success
}

/// Sync on a fixed interval until the engine shuts down.
///
/// For hosts that have no platform scheduler. The first sync happens one
/// interval after the call.
pub fn spawn_periodic_sync(engine: EngineHandle, interval: Duration) -> JoinHandle<()> {
    // A zero period would make the ticker panic.
    let interval = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if engine.is_closed() {
                break;
            }
            let success = engine.sync_from_external().await;
            debug!(success, "periodic sync");
        }
        info!("periodic sync stopped");
    })
}

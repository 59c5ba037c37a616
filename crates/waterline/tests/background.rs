//! Background task handling and periodic sync.

mod common;

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::{eventually, start};
use waterline::{
    handle_background_tasks, spawn_periodic_sync, BackgroundTask, EngineError, LifecycleState,
    RefreshScheduler, TaskCompletion, TaskResult,
};
use waterline_testkit::TestFixture;

const HOUR: Duration = Duration::from_secs(60 * 60);

#[derive(Default)]
struct RecordingScheduler {
    requests: Mutex<Vec<Duration>>,
    fail: bool,
}

impl RecordingScheduler {
    fn requests(&self) -> Vec<Duration> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RefreshScheduler for RecordingScheduler {
    async fn schedule_refresh(&self, delay: Duration) -> waterline::Result<()> {
        self.requests.lock().unwrap().push(delay);
        if self.fail {
            return Err(EngineError::Schedule("refresh budget exhausted".into()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_app_refresh_syncs_flushes_and_reschedules() {
    let fixture = TestFixture::new();
    let id = fixture.insert_foreign(300.0, fixture.ago(HOUR));
    let engine = start(&fixture).await;
    let scheduler = RecordingScheduler::default();

    let (completion, result) = TaskCompletion::new();
    handle_background_tasks(&engine, &scheduler, vec![BackgroundTask::AppRefresh(completion)])
        .await;

    assert_eq!(result.await.unwrap(), TaskResult::with_snapshot(true));
    assert_eq!(scheduler.requests(), vec![Duration::from_secs(15 * 60)]);
    assert!(engine.snapshot().contains(id));

    let durable = fixture.store.durable_records().unwrap();
    assert!(durable.iter().any(|r| r.id() == id));
}

#[tokio::test]
async fn test_app_refresh_restores_lifecycle() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    let scheduler = RecordingScheduler::default();

    let (completion, result) = TaskCompletion::new();
    handle_background_tasks(&engine, &scheduler, vec![BackgroundTask::AppRefresh(completion)])
        .await;
    assert!(result.await.unwrap().snapshot);

    let during_refresh = engine
        .set_lifecycle(LifecycleState::Background)
        .await
        .unwrap();
    assert_eq!(during_refresh, LifecycleState::Foreground);
}

#[tokio::test]
async fn test_app_refresh_keeps_background_host_in_background() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    engine
        .set_lifecycle(LifecycleState::Background)
        .await
        .unwrap();
    let scheduler = RecordingScheduler::default();

    let (completion, result) = TaskCompletion::new();
    handle_background_tasks(&engine, &scheduler, vec![BackgroundTask::AppRefresh(completion)])
        .await;
    assert!(result.await.unwrap().snapshot);

    let after = engine
        .set_lifecycle(LifecycleState::Foreground)
        .await
        .unwrap();
    assert_eq!(after, LifecycleState::Background);
}

#[tokio::test]
async fn test_failed_refresh_is_not_rescheduled() {
    let fixture = TestFixture::new();
    fixture.health.fail_next_queries(1);
    let engine = start(&fixture).await;
    let scheduler = RecordingScheduler::default();

    let (completion, result) = TaskCompletion::new();
    handle_background_tasks(&engine, &scheduler, vec![BackgroundTask::AppRefresh(completion)])
        .await;

    assert!(!result.await.unwrap().snapshot);
    assert!(scheduler.requests().is_empty());
}

#[tokio::test]
async fn test_scheduler_error_still_completes_task() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    let scheduler = RecordingScheduler {
        fail: true,
        ..RecordingScheduler::default()
    };

    let (completion, result) = TaskCompletion::new();
    handle_background_tasks(&engine, &scheduler, vec![BackgroundTask::AppRefresh(completion)])
        .await;

    assert!(result.await.unwrap().snapshot);
    assert_eq!(scheduler.requests().len(), 1);
}

#[tokio::test]
async fn test_other_tasks_complete_without_work() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    let scheduler = RecordingScheduler::default();

    let (snapshot, snapshot_rx) = TaskCompletion::new();
    let (connectivity, connectivity_rx) = TaskCompletion::new();
    let (url, url_rx) = TaskCompletion::new();
    let (shortcut, shortcut_rx) = TaskCompletion::new();
    let (intent, intent_rx) = TaskCompletion::new();
    handle_background_tasks(
        &engine,
        &scheduler,
        vec![
            BackgroundTask::Snapshot(snapshot),
            BackgroundTask::Connectivity(connectivity),
            BackgroundTask::UrlSession(url),
            BackgroundTask::RelevantShortcut(shortcut),
            BackgroundTask::IntentDidRun(intent),
        ],
    )
    .await;

    assert_eq!(
        snapshot_rx.await.unwrap(),
        TaskResult {
            snapshot: false,
            restored_default_state: true,
        }
    );
    for rx in [connectivity_rx, url_rx, shortcut_rx, intent_rx] {
        assert_eq!(rx.await.unwrap(), TaskResult::with_snapshot(false));
    }
    assert_eq!(fixture.health.query_count(), 0);
}

#[tokio::test]
async fn test_refresh_after_shutdown_reports_no_snapshot() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    engine.shutdown().await.unwrap();
    let scheduler = RecordingScheduler::default();

    let (completion, result) = TaskCompletion::new();
    handle_background_tasks(&engine, &scheduler, vec![BackgroundTask::AppRefresh(completion)])
        .await;

    assert!(!result.await.unwrap().snapshot);
    assert!(scheduler.requests().is_empty());
}

#[tokio::test]
async fn test_periodic_sync_runs_until_shutdown() {
    let fixture = TestFixture::new();
    let id = fixture.insert_foreign(300.0, fixture.ago(HOUR));
    let engine = start(&fixture).await;

    let ticker = spawn_periodic_sync(engine.clone(), Duration::from_millis(10));
    assert!(eventually(|| fixture.health.query_count() >= 2).await);
    assert!(engine.snapshot().contains(id));

    engine.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), ticker)
        .await
        .expect("periodic sync stops after shutdown")
        .unwrap();
}

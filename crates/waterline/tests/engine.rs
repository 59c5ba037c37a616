//! Local additions, aggregates, persistence and shutdown.

mod common;

use std::time::Duration;

use common::{eventually, start, start_with, test_config};
use waterline::store::{MemoryStore, SaveOutcome, StoreError};
use waterline::{Engine, EngineError, LifecycleState, Record, RecordId, StatusLevel};
use waterline_testkit::{TestFixture, NOON};

const HOUR: Duration = Duration::from_secs(60 * 60);
const MINUTE: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────────────────────────────────────
// Local Additions
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_add_increases_total_by_amount() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    engine
        .add_local_record(300.0, fixture.ago(2 * HOUR))
        .await
        .unwrap();

    let before = engine.snapshot().current_total(NOON);
    let record = engine.add_local_record(250.0, NOON).await.unwrap();
    let after = engine.snapshot().current_total(NOON);

    assert_eq!(after, before + 250.0);
    assert_eq!(record.amount(), 250.0);
    assert!(engine.snapshot().contains(record.id()));
}

#[tokio::test]
async fn test_records_published_in_time_order() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;

    engine.add_local_record(100.0, fixture.ago(HOUR)).await.unwrap();
    engine.add_local_record(200.0, fixture.ago(3 * HOUR)).await.unwrap();
    engine.add_local_record(300.0, fixture.ago(2 * HOUR)).await.unwrap();

    let amounts: Vec<f64> = engine
        .snapshot()
        .records()
        .iter()
        .map(Record::amount)
        .collect();
    assert_eq!(amounts, vec![200.0, 300.0, 100.0]);
}

#[tokio::test]
async fn test_invalid_amount_rejected() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;

    for amount in [-1.0, f64::NAN, f64::INFINITY] {
        let err = engine.add_local_record(amount, NOON).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{amount}: {err}");
    }
    assert!(engine.snapshot().is_empty());
    assert_eq!(engine.snapshot().version(), 0);
}

#[tokio::test]
async fn test_zero_amount_accepted() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;

    let record = engine.add_local_record(0.0, NOON).await.unwrap();
    assert!(engine.snapshot().contains(record.id()));
    assert_eq!(engine.snapshot().current_total(NOON), 0.0);
}

#[tokio::test]
async fn test_add_outside_window_is_returned_but_not_kept() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;

    let record = engine
        .add_local_record(250.0, fixture.ago(25 * HOUR))
        .await
        .unwrap();

    assert_eq!(record.amount(), 250.0);
    assert!(!engine.snapshot().contains(record.id()));
    assert!(engine.snapshot().is_empty());
}

#[tokio::test]
async fn test_expired_records_drop_on_next_mutation() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    let old = engine.add_local_record(250.0, NOON).await.unwrap();

    fixture.clock.advance(25 * HOUR);
    let fresh = engine
        .add_local_record(100.0, fixture.now())
        .await
        .unwrap();

    let snapshot = engine.snapshot();
    assert!(!snapshot.contains(old.id()));
    assert!(snapshot.contains(fresh.id()));
}

#[tokio::test]
async fn test_subscribers_see_each_publish() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    let mut rx = engine.subscribe();
    assert_eq!(rx.borrow_and_update().version(), 0);

    engine.add_local_record(250.0, NOON).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().len(), 1);

    engine.add_local_record(250.0, NOON).await.unwrap();
    rx.changed().await.unwrap();
    let latest = rx.borrow_and_update().clone();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest.version(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregates
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_servings_of_300_is_3_6_cups() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    for hours in 1..=3 {
        engine
            .add_local_record(300.0, fixture.ago(hours * HOUR))
            .await
            .unwrap();
    }

    let snapshot = engine.snapshot();
    assert!((snapshot.daily_equivalent_count(NOON) - 3.6).abs() < 1e-9);
    assert_eq!(snapshot.dose_level(NOON), StatusLevel::High);
}

#[tokio::test]
async fn test_timeline_from_engine_snapshot() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    engine.add_local_record(150.0, NOON - 20 * MINUTE).await.unwrap();

    let entries = engine
        .snapshot()
        .timeline_entries(NOON - 30 * MINUTE, 2, 15 * MINUTE);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].total_ml, 0.0);
    assert_eq!(entries[1].total_ml, 150.0);
    assert_eq!(entries[1].level, StatusLevel::Low);
}

// ─────────────────────────────────────────────────────────────────────────────
// Hydration
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hydration_drops_expired_records() {
    let old = Record::new(500.0, NOON - 25 * HOUR).unwrap();
    let fresh = Record::new(250.0, NOON - HOUR).unwrap();
    let fixture =
        TestFixture::with_store(MemoryStore::with_records(vec![fresh.clone(), old.clone()]));
    let engine = start(&fixture).await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.records(), &[fresh.clone()]);

    // The filtered set was written back during startup.
    assert_eq!(engine.flush().await.unwrap(), SaveOutcome::Skipped);
    assert_eq!(fixture.store.durable_records(), Some(vec![fresh]));
}

#[tokio::test]
async fn test_hydration_sorts_records() {
    let later = Record::new(100.0, NOON - HOUR).unwrap();
    let earlier = Record::new(200.0, NOON - 2 * HOUR).unwrap();
    let fixture =
        TestFixture::with_store(MemoryStore::with_records(vec![later.clone(), earlier.clone()]));
    let engine = start(&fixture).await;

    assert_eq!(engine.snapshot().records(), &[earlier, later]);
}

#[tokio::test]
async fn test_hydration_keeps_one_record_per_id() {
    let id = RecordId::from_bytes([7; 16]);
    let first = Record::with_id(100.0, NOON - 2 * HOUR, id).unwrap();
    let last = Record::with_id(200.0, NOON - HOUR, id).unwrap();
    let fixture = TestFixture::with_store(MemoryStore::with_records(vec![first, last.clone()]));
    let engine = start(&fixture).await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.records(), &[last.clone()]);
    assert_eq!(snapshot.current_total(NOON), 200.0);

    engine.flush().await.unwrap();
    assert_eq!(fixture.store.durable_records(), Some(vec![last]));
}

#[tokio::test]
async fn test_unreadable_store_is_fatal() {
    let fixture = TestFixture::with_store(MemoryStore::corrupted());
    common::init_tracing();

    let result = Engine::start(
        test_config(),
        fixture.store.clone(),
        fixture.health.clone(),
        fixture.clock.clone(),
    )
    .await;

    assert!(matches!(
        result,
        Err(EngineError::Store(StoreError::Serialization(_)))
    ));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let fixture = TestFixture::new();
    let mut config = test_config();
    config.command_queue_depth = 0;

    let result = Engine::start(
        config,
        fixture.store.clone(),
        fixture.health.clone(),
        fixture.clock.clone(),
    )
    .await;
    assert!(matches!(result, Err(EngineError::Config(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unchanged_set_is_written_once() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;

    engine.add_local_record(250.0, NOON).await.unwrap();
    assert_eq!(engine.flush().await.unwrap(), SaveOutcome::Skipped);
    assert_eq!(engine.flush().await.unwrap(), SaveOutcome::Skipped);

    assert_eq!(fixture.store.write_count(), 1);
}

#[tokio::test]
async fn test_background_save_is_durable_before_reply() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    engine
        .set_lifecycle(LifecycleState::Background)
        .await
        .unwrap();

    let record = engine.add_local_record(250.0, NOON).await.unwrap();

    assert_eq!(fixture.store.durable_records(), Some(vec![record]));
}

#[tokio::test]
async fn test_failed_save_is_retried_by_flush() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    engine
        .set_lifecycle(LifecycleState::Background)
        .await
        .unwrap();

    fixture.store.fail_next_saves(1);
    let record = engine.add_local_record(250.0, NOON).await.unwrap();
    // The failure doesn't undo the in-memory change.
    assert!(engine.snapshot().contains(record.id()));
    assert_eq!(fixture.store.durable_records(), None);

    assert!(engine.flush().await.unwrap().is_written());
    assert_eq!(fixture.store.durable_records(), Some(vec![record]));
}

#[tokio::test]
async fn test_cancelled_save_leaves_previous_state() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    engine
        .set_lifecycle(LifecycleState::Background)
        .await
        .unwrap();

    // Let the startup save land so the cancel reaches the add's save.
    engine.flush().await.unwrap();

    engine.cancel_pending_save();
    let record = engine.add_local_record(250.0, NOON).await.unwrap();
    assert_eq!(fixture.store.durable_records(), None);

    // Only that one save was cancelled.
    assert!(engine.flush().await.unwrap().is_written());
    assert_eq!(fixture.store.durable_records(), Some(vec![record]));
}

#[tokio::test]
async fn test_idle_cancel_lapses_on_return_to_foreground() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    engine
        .set_lifecycle(LifecycleState::Background)
        .await
        .unwrap();
    engine.flush().await.unwrap();

    // Nothing is pending when the background task gives up.
    engine.cancel_pending_save();
    engine
        .set_lifecycle(LifecycleState::Foreground)
        .await
        .unwrap();

    let record = engine.add_local_record(250.0, NOON).await.unwrap();
    let expected = Some(vec![record]);
    assert!(eventually(|| fixture.store.durable_records() == expected).await);
}

#[tokio::test]
async fn test_cancel_consumed_by_unchanged_save() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    engine
        .set_lifecycle(LifecycleState::Background)
        .await
        .unwrap();
    engine.flush().await.unwrap();

    engine.cancel_pending_save();
    assert_eq!(engine.flush().await.unwrap(), SaveOutcome::Skipped);

    let record = engine.add_local_record(250.0, NOON).await.unwrap();
    assert_eq!(fixture.store.durable_records(), Some(vec![record]));
}

// ─────────────────────────────────────────────────────────────────────────────
// Shutdown
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_shutdown_drains_pending_saves() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;

    let record = engine.add_local_record(250.0, NOON).await.unwrap();
    engine.shutdown().await.unwrap();

    assert_eq!(fixture.store.durable_records(), Some(vec![record]));
}

#[tokio::test]
async fn test_closed_engine_rejects_commands() {
    let fixture = TestFixture::new();
    let engine = start(&fixture).await;
    let other = engine.clone();

    engine.shutdown().await.unwrap();

    assert!(other.is_closed());
    assert!(matches!(
        other.add_local_record(250.0, NOON).await,
        Err(EngineError::Closed)
    ));
    assert!(!other.sync_from_external().await);
    assert!(matches!(other.flush().await, Err(EngineError::Closed)));
    assert!(matches!(other.shutdown().await, Err(EngineError::Closed)));
}

#[tokio::test]
async fn test_small_command_queue_still_serves_bursts() {
    let fixture = TestFixture::new();
    let mut config = test_config();
    config.command_queue_depth = 1;
    let engine = start_with(&fixture, config).await;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .add_local_record(10.0, NOON - Duration::from_secs(i))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(engine.snapshot().len(), 20);
    assert_eq!(engine.snapshot().current_total(NOON), 200.0);
}

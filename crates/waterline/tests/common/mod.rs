//! Shared setup for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use waterline::{Engine, EngineConfig, EngineHandle};
use waterline_testkit::TestFixture;

/// Route engine logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Defaults, minus the pull on startup so tests control every sync.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.sync.sync_on_start = false;
    config
}

pub async fn start(fixture: &TestFixture) -> EngineHandle {
    start_with(fixture, test_config()).await
}

pub async fn start_with(fixture: &TestFixture, config: EngineConfig) -> EngineHandle {
    init_tracing();
    Engine::start(
        config,
        Arc::clone(&fixture.store),
        Arc::clone(&fixture.health),
        Arc::clone(&fixture.clock),
    )
    .await
    .expect("engine starts")
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Sync until `check` holds. Pushes that failed before authorization are
/// retried after a successful pull, which may take a round.
pub async fn sync_until(engine: &EngineHandle, mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        engine.sync_from_external().await;
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

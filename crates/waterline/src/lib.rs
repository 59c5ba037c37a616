//! # Waterline
//!
//! Water-intake tracking for wearables: local records reconciled with an
//! external health-record store, a rolling 24-hour window, and the
//! aggregates watch faces display.
//!
//! ## Overview
//!
//! The [`Engine`] owns the single authoritative record set. It:
//!
//! - **Hydrates** from a [`PersistenceStore`](store::PersistenceStore) at startup
//! - **Adds** local intake events and pushes them to the external store
//! - **Pulls** additions and deletions incrementally with a persisted cursor
//! - **Retains** only the trailing window after every mutation
//! - **Persists** each new set in order, skipping unchanged ones
//! - **Publishes** immutable [`Snapshot`]s that readers never see half-built
//!
//! ## Usage
//!
//! ```rust,no_run
//! use waterline::{Engine, EngineConfig};
//! use waterline::core::{SystemClock, Timestamp};
//! use waterline::sync::{MemoryHealthStore, SourceId};
//!
//! async fn example() {
//!     let config = EngineConfig::default();
//!     let store = config.store.open().unwrap();
//!     let health = MemoryHealthStore::new(SourceId::new("app.waterline"));
//!
//!     let engine = Engine::start(config, store, health, SystemClock).await.unwrap();
//!
//!     engine.add_local_record(250.0, Timestamp::now()).await.unwrap();
//!     engine.sync_from_external().await;
//!
//!     let snapshot = engine.snapshot();
//!     let total = snapshot.current_total(Timestamp::now());
//!     let cups = snapshot.daily_equivalent_count(Timestamp::now());
//!     # let _ = (total, cups);
//!
//!     engine.shutdown().await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `waterline::core` - Records, retention, aggregates
//! - `waterline::store` - Persistence abstraction and the file store
//! - `waterline::sync` - External health-store interface and adapter

pub mod background;
pub mod config;
pub mod engine;
pub mod error;
pub mod persist;
pub mod snapshot;
pub mod timeline;

// Re-export component crates
pub use waterline_core as core;
pub use waterline_store as store;
pub use waterline_sync as sync;

// Re-export main types for convenience
pub use background::{
    handle_background_tasks, spawn_periodic_sync, BackgroundTask, RefreshScheduler,
    TaskCompletion, TaskResult,
};
pub use config::{AggregateConfig, EngineConfig, StoreConfig, SyncConfig};
pub use engine::{Engine, EngineHandle};
pub use error::{EngineError, Result};
pub use persist::LifecycleState;
pub use snapshot::Snapshot;
pub use timeline::TimelineEntry;

// Re-export commonly used core types
pub use waterline_core::{Record, RecordId, Serving, StatusLevel, Thresholds, Timestamp};

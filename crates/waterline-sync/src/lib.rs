//! # Waterline Sync
//!
//! Synchronization with the external health-record store.
//!
//! ## Overview
//!
//! The external store is authoritative for samples shared between
//! applications. Waterline pulls additions and deletions incrementally using
//! an opaque anchor, and pushes locally created records tagged with their id
//! so later deletions can be traced back.
//!
//! ## Key Properties
//!
//! - **Incremental**: every pull starts from the cursor the previous one returned
//! - **Provenance aware**: samples this application wrote are never pulled back
//! - **Traceable deletes**: pushed samples embed the record id in their metadata
//!
//! ## Usage
//!
//! ```rust,no_run
//! use waterline_core::{RetentionWindow, Timestamp};
//! use waterline_sync::{MemoryHealthStore, SourceId, SyncAdapter};
//!
//! async fn example() {
//!     let adapter = SyncAdapter::new(MemoryHealthStore::new(SourceId::new("app.waterline")));
//!
//!     if adapter.authorize().await {
//!         let pulled = adapter
//!             .pull(None, RetentionWindow::default(), Timestamp::now())
//!             .await
//!             .unwrap();
//!         // Hand pulled.new_records / pulled.deleted to the engine and keep
//!         // pulled.new_cursor for the next pull.
//!     }
//! }
//! ```

pub mod adapter;
pub mod error;
pub mod health_store;

pub use adapter::{DeletedRef, PullResult, SyncAdapter};
pub use error::{Result, SyncError};
pub use health_store::{
    memory::MemoryHealthStore, AnchoredQuery, AuthorizationStatus, DeletedObject, HealthStore,
    QuantitySample, QueryResult, SampleMetadata, SampleType, SourceId, TimeRange, SCHEMA_VERSION,
};

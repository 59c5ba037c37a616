//! # Waterline Store
//!
//! Durable storage for the active record set and the sync cursor.
//!
//! ## Overview
//!
//! The store abstracts persistence behind the [`PersistenceStore`] trait so
//! the engine is storage-agnostic. The primary implementation is
//! [`FileStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`PersistenceStore`] - The async trait for all storage operations
//! - [`FileStore`] - Atomic file-based storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`SaveOutcome`] - Whether a save touched the disk
//! - [`SyncCursor`] - Opaque position marker for incremental external queries
//! - [`CancelToken`] - Cooperative cancellation for saves in constrained contexts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use waterline_store::{CancelToken, FileStore, PersistenceStore};
//!
//! async fn example() {
//!     let store = FileStore::open("/var/lib/waterline").unwrap();
//!
//!     let records = store.load().await.unwrap();
//!     let outcome = store.save(&records, &CancelToken::new()).await.unwrap();
//!     // Nothing changed since load, so nothing was written.
//!     assert!(!outcome.is_written());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic replace**: every write goes to a temp file, is fsynced, then renamed
//! - **Dirty check**: a save equal to the last durable state is skipped
//! - **Absent is empty**: a missing records file loads as an empty set
//! - **Independent cursor**: the cursor lives in its own file

pub mod cancel;
pub mod cursor;
pub mod error;
pub mod file;
pub mod memory;
pub mod migration;
pub mod traits;

pub use cancel::CancelToken;
pub use cursor::SyncCursor;
pub use error::{Result, StoreError};
pub use file::{FileStore, CURSOR_FILE, RECORDS_FILE};
pub use memory::MemoryStore;
pub use traits::{PersistenceStore, SaveOutcome};

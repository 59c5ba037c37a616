//! The sync cursor: an opaque "last observed position" in the external store.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token handed back by the external store after each query.
///
/// Waterline never interprets the bytes. It only stores them and passes
/// them to the next query.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncCursor(Bytes);

impl SyncCursor {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncCursor({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for SyncCursor {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<Bytes> for SyncCursor {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

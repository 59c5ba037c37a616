//! On-disk format of the records file, with versioned migrations.
//!
//! Version 1 is a canonical CBOR map:
//!
//! ```text
//! { 0: format_version, 1: [record, ...], 2: blake3(canonical records) }
//! ```
//!
//! Version 0 predates the envelope and is a bare CBOR array of records. Each
//! migration transforms the decoded value from version N to N+1.

use ciborium::value::Value;
use tracing::debug;
use waterline_core::{
    canonical::record_to_value, encode_canonical, records_digest, records_from_value, Record,
};

use crate::error::{Result, StoreError};

/// Current format version.
pub const CURRENT_VERSION: u32 = 1;

/// Envelope field keys.
mod keys {
    pub const VERSION: u64 = 0;
    pub const RECORDS: u64 = 1;
    pub const DIGEST: u64 = 2;
}

/// Encode a record set at the current version.
pub fn encode(records: &[Record]) -> Vec<u8> {
    let envelope = Value::Map(vec![
        (
            Value::Integer(keys::VERSION.into()),
            Value::Integer(CURRENT_VERSION.into()),
        ),
        (
            Value::Integer(keys::RECORDS.into()),
            Value::Array(records.iter().map(record_to_value).collect()),
        ),
        (
            Value::Integer(keys::DIGEST.into()),
            Value::Bytes(records_digest(records).0.to_vec()),
        ),
    ]);
    encode_canonical(&envelope)
}

/// Decode a records file of any supported version.
pub fn decode(bytes: &[u8]) -> Result<Vec<Record>> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;

    let found = detect_version(&value)?;
    if found > CURRENT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found,
            supported: CURRENT_VERSION,
        });
    }

    let mut value = value;
    for version in (found + 1)..=CURRENT_VERSION {
        debug!(from = version - 1, to = version, "migrating records file");
        value = apply_migration(value, version)?;
    }

    read_v1(&value)
}

/// Determine which version produced `value`.
fn detect_version(value: &Value) -> Result<u32> {
    match value {
        Value::Array(_) => Ok(0),
        Value::Map(_) => match field(value, keys::VERSION) {
            Some(Value::Integer(i)) => u32::try_from(i128::from(*i))
                .map_err(|_| StoreError::Serialization("format version out of range".into())),
            _ => Err(StoreError::Serialization("missing format version".into())),
        },
        _ => Err(StoreError::Serialization(
            "expected envelope map or legacy record array".into(),
        )),
    }
}

/// Apply a specific migration version.
fn apply_migration(value: Value, version: u32) -> Result<Value> {
    match version {
        1 => migrate_v1(value),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: wrap the bare record array in a digested envelope.
fn migrate_v1(value: Value) -> Result<Value> {
    let records = records_from_value(&value)?;
    let digest = records_digest(&records);
    Ok(Value::Map(vec![
        (Value::Integer(keys::VERSION.into()), Value::Integer(1.into())),
        (Value::Integer(keys::RECORDS.into()), value),
        (
            Value::Integer(keys::DIGEST.into()),
            Value::Bytes(digest.0.to_vec()),
        ),
    ]))
}

/// Parse and verify a version 1 envelope.
fn read_v1(value: &Value) -> Result<Vec<Record>> {
    let records_value = field(value, keys::RECORDS)
        .ok_or_else(|| StoreError::Serialization("missing records".into()))?;
    let records = records_from_value(records_value)?;

    let stored = match field(value, keys::DIGEST) {
        Some(Value::Bytes(b)) => b.clone(),
        _ => return Err(StoreError::Serialization("missing digest".into())),
    };
    let computed = records_digest(&records);
    if stored.as_slice() != computed.0.as_slice() {
        return Err(StoreError::DigestMismatch {
            stored: hex_prefix(&stored),
            computed: computed.to_hex()[..16].to_string(),
        });
    }

    Ok(records)
}

/// Look up an envelope field by integer key.
fn field(value: &Value, key: u64) -> Option<&Value> {
    match value {
        Value::Map(entries) => entries
            .iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == i128::from(key)))
            .map(|(_, v)| v),
        _ => None,
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

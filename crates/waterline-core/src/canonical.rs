//! Canonical CBOR encoding for record sets.
//!
//! This module implements a subset of RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - Floats always use the 8-byte form, so a given amount has one encoding
//!
//! The same record set always produces identical bytes, which is what makes
//! the on-disk digest meaningful.

use ciborium::value::Value;

use crate::error::CoreError;
use crate::record::Record;
use crate::types::{RecordId, Timestamp};

/// Record field keys (integer keys for compact encoding).
mod keys {
    pub const AMOUNT: u64 = 0;
    pub const TIMESTAMP: u64 = 1;
    pub const ID: u64 = 2;
}

/// A 32-byte Blake3 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Convert a record to a CBOR Value (map with integer keys).
pub fn record_to_value(record: &Record) -> Value {
    Value::Map(vec![
        (
            Value::Integer(keys::AMOUNT.into()),
            Value::Float(record.amount()),
        ),
        (
            Value::Integer(keys::TIMESTAMP.into()),
            Value::Integer(record.timestamp().as_millis().into()),
        ),
        (
            Value::Integer(keys::ID.into()),
            Value::Bytes(record.id().as_bytes().to_vec()),
        ),
    ])
}

/// Convert a CBOR Value (map) back to a Record.
pub fn record_from_value(value: &Value) -> Result<Record, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedRecord("expected map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| match k {
                Value::Integer(i) => i128::from(*i) == i128::from(key),
                _ => false,
            })
            .map(|(_, v)| v)
    };

    let amount = match get(keys::AMOUNT) {
        Some(Value::Float(f)) => *f,
        Some(Value::Integer(i)) => i128::from(*i) as f64,
        _ => return Err(CoreError::MalformedRecord("missing amount".into())),
    };

    let timestamp = match get(keys::TIMESTAMP) {
        Some(Value::Integer(i)) => i64::try_from(i128::from(*i))
            .map_err(|_| CoreError::MalformedRecord("timestamp out of range".into()))?,
        _ => return Err(CoreError::MalformedRecord("missing timestamp".into())),
    };

    let id = match get(keys::ID) {
        Some(Value::Bytes(b)) => RecordId::try_from(b.as_slice())
            .map_err(|_| CoreError::MalformedRecord("id must be 16 bytes".into()))?,
        _ => return Err(CoreError::MalformedRecord("missing id".into())),
    };

    Ok(Record::with_id(amount, Timestamp(timestamp), id)?)
}

/// Encode a record sequence to canonical bytes (a CBOR array of maps).
pub fn canonical_records_bytes(records: &[Record]) -> Vec<u8> {
    let value = Value::Array(records.iter().map(record_to_value).collect());
    encode_canonical(&value)
}

/// Blake3 digest of the canonical encoding.
pub fn records_digest(records: &[Record]) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"waterline-records-v1:");
    hasher.update(&canonical_records_bytes(records));
    Digest(*hasher.finalize().as_bytes())
}

/// Decode a record sequence from a CBOR array.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<Record>, CoreError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    records_from_value(&value)
}

/// Decode records from an already-parsed CBOR array.
pub fn records_from_value(value: &Value) -> Result<Vec<Record>, CoreError> {
    match value {
        Value::Array(items) => items.iter().map(record_from_value).collect(),
        _ => Err(CoreError::MalformedRecord("expected array of records".into())),
    }
}

/// Encode a CBOR Value to canonical bytes.
pub fn encode_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Float(f) => {
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        // Null, and the tag/simple types a record set never contains.
        _ => buf.push(0xf6),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Record> {
        vec![
            Record::with_id(250.0, Timestamp(1_000), RecordId::from_bytes([1; 16])).unwrap(),
            Record::with_id(500.5, Timestamp(2_000), RecordId::from_bytes([2; 16])).unwrap(),
        ]
    }

    #[test]
    fn test_encoding_is_deterministic() {
        assert_eq!(
            canonical_records_bytes(&sample()),
            canonical_records_bytes(&sample())
        );
    }

    #[test]
    fn test_decode_recovers_records() {
        let records = sample();
        let decoded = decode_records(&canonical_records_bytes(&records)).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_map_keys_sorted_regardless_of_input_order() {
        let shuffled = Value::Map(vec![
            (Value::Integer(2.into()), Value::Bytes(vec![7; 16])),
            (Value::Integer(0.into()), Value::Float(1.5)),
            (Value::Integer(1.into()), Value::Integer(9.into())),
        ]);
        let record = record_from_value(&shuffled).unwrap();
        assert_eq!(encode_canonical(&shuffled), encode_canonical(&record_to_value(&record)));
    }

    #[test]
    fn test_digest_changes_with_amount() {
        let mut other = sample();
        other[1] = Record::with_id(501.0, Timestamp(2_000), RecordId::from_bytes([2; 16])).unwrap();
        assert_ne!(records_digest(&sample()), records_digest(&other));
    }

    #[test]
    fn test_negative_amount_rejected_on_decode() {
        let bad = Value::Array(vec![Value::Map(vec![
            (Value::Integer(0.into()), Value::Float(-3.0)),
            (Value::Integer(1.into()), Value::Integer(1.into())),
            (Value::Integer(2.into()), Value::Bytes(vec![1; 16])),
        ])]);
        let bytes = encode_canonical(&bad);
        assert!(matches!(
            decode_records(&bytes),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_short_id_rejected() {
        let bad = Value::Map(vec![
            (Value::Integer(0.into()), Value::Float(3.0)),
            (Value::Integer(1.into()), Value::Integer(1.into())),
            (Value::Integer(2.into()), Value::Bytes(vec![1; 4])),
        ]);
        assert!(record_from_value(&bad).is_err());
    }
}

//! Golden vectors for the canonical record encoding.
//!
//! The records file digest is computed over these bytes, so any change to
//! the encoding would make existing files fail verification. Every entry
//! pins the exact bytes for a known record set.

use serde::{Deserialize, Serialize};

use waterline_core::{canonical_records_bytes, decode_records, Record, RecordId, Timestamp};

/// One record of a golden vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub amount: f64,
    pub timestamp: i64,
    /// 16 bytes hex.
    pub id: String,
}

/// A single golden test vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenVector {
    pub name: String,
    pub description: String,
    pub records: Vec<VectorRecord>,
    /// Expected canonical bytes, hex.
    pub canonical: String,
}

impl GoldenVector {
    /// Build the record set the vector describes.
    pub fn build_records(&self) -> Vec<Record> {
        self.records
            .iter()
            .map(|r| {
                let id = RecordId::parse(&r.id).expect("vector ids are valid");
                Record::with_id(r.amount, Timestamp(r.timestamp), id)
                    .expect("vector amounts are valid")
            })
            .collect()
    }
}

/// All known vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    serde_json::from_str(VECTORS_JSON).expect("embedded vectors are valid JSON")
}

/// Check every vector in both directions. Returns the names that failed.
pub fn verify_all_vectors() -> Vec<String> {
    all_vectors()
        .into_iter()
        .filter(|v| {
            let records = v.build_records();
            let encoded = hex::encode(canonical_records_bytes(&records));
            let decoded = hex::decode(&v.canonical)
                .ok()
                .and_then(|bytes| decode_records(&bytes).ok());
            encoded != v.canonical || decoded.as_ref() != Some(&records)
        })
        .map(|v| v.name)
        .collect()
}

const VECTORS_JSON: &str = r#"[
  {
    "name": "empty",
    "description": "An empty record set is an empty array",
    "records": [],
    "canonical": "80"
  },
  {
    "name": "single_cup",
    "description": "One 250 mL record at 2021-09-22T12:00:00Z",
    "records": [
      { "amount": 250.0, "timestamp": 1632312000000, "id": "11111111111111111111111111111111" }
    ],
    "canonical": "81a300fb406f400000000000011b0000017c0d607e00025011111111111111111111111111111111"
  },
  {
    "name": "zero_and_negative_time",
    "description": "A zero amount at the epoch and a fractional amount before it",
    "records": [
      { "amount": 0.0, "timestamp": 0, "id": "000102030405060708090a0b0c0d0e0f" },
      { "amount": 333.5, "timestamp": -1, "id": "ffffffffffffffffffffffffffffffff" }
    ],
    "canonical": "82a300fb000000000000000001000250000102030405060708090a0b0c0d0e0fa300fb4074d8000000000001200250ffffffffffffffffffffffffffffffff"
  }
]"#;

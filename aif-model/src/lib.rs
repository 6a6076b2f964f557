//! Shared data model for the aifbin-recall retrieval pipeline.
//!
//! `Collection` and `MemoryChunk` are the two persisted entities; `Value` is
//! the opaque tagged-union used for free-form metadata so the binary parser
//! and the store can round-trip unknown keys without schema pressure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque primary key for collections and chunks.
pub type Id = Uuid;

/// A self-describing value used for free-form, schema-less metadata.
///
/// Mirrors the tagged union the on-disk object-notation encoding uses
/// (null/bool/int/float/string/bytes/array/map), so metadata read from a
/// `.aif-bin` file round-trips through the store without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f32_seq(&self) -> Option<Vec<f32>> {
        match self {
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Some(*f as f32),
                    Value::Int(i) => Some(*i as f32),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

/// Opaque key -> [`Value`] map, persisted verbatim alongside a chunk.
pub type Metadata = BTreeMap<String, Value>;

/// A named bucket of chunks sharing one embedding dimensionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    pub file_count: i64,
    pub chunk_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A unit of retrievable content: text, its embedding, and free-form metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryChunk {
    pub id: Id,
    pub collection_id: Id,
    pub source_file: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryChunk {
    /// `(collection_id, source_file, chunk_index)` identifies this chunk
    /// within a collection's view; `id` remains the primary key.
    pub fn source_key(&self) -> (Id, &str, i64) {
        (self.collection_id, self.source_file.as_str(), self.chunk_index)
    }
}

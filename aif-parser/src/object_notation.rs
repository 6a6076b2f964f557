//! Self-describing object-notation codec used for the `.aif-bin` metadata
//! section and per-chunk metadata blobs (spec.md §6.1).
//!
//! Wire shape: a one-byte tag followed by a type-specific payload, all
//! integers little-endian.
//!
//! | tag | meaning | payload |
//! |---|---|---|
//! | 0 | null | (none) |
//! | 1 | bool | 1 byte, 0/1 |
//! | 2 | int | 8 bytes, i64 |
//! | 3 | float | 8 bytes, f64 |
//! | 4 | string | u64 byte length, then UTF-8 bytes |
//! | 5 | bytes | u64 byte length, then raw bytes |
//! | 6 | array | u64 element count, then that many values |
//! | 7 | map | u64 entry count, then that many (string key, value) pairs |

use std::collections::BTreeMap;

use aif_model::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObjectNotationError {
    #[error("unexpected end of object-notation buffer")]
    Truncated,
    #[error("unknown object-notation tag {0}")]
    UnknownTag(u8),
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
}

type ObjResult<T> = Result<T, ObjectNotationError>;

/// Decode a single self-describing value starting at `*offset`, advancing it
/// past the value's bytes.
pub fn decode_value(buf: &[u8], offset: &mut usize) -> ObjResult<Value> {
    let tag = read_u8(buf, offset)?;
    match tag {
        0 => Ok(Value::Null),
        1 => Ok(Value::Bool(read_u8(buf, offset)? != 0)),
        2 => Ok(Value::Int(read_i64(buf, offset)?)),
        3 => Ok(Value::Float(read_f64(buf, offset)?)),
        4 => Ok(Value::String(read_string(buf, offset)?)),
        5 => Ok(Value::Bytes(read_bytes(buf, offset)?)),
        6 => {
            let count = read_u64(buf, offset)? as usize;
            let mut items = Vec::with_capacity(count.min(1 << 16));
            for _ in 0..count {
                items.push(decode_value(buf, offset)?);
            }
            Ok(Value::Array(items))
        }
        7 => {
            let count = read_u64(buf, offset)? as usize;
            let mut map = BTreeMap::new();
            for _ in 0..count {
                let key = read_string(buf, offset)?;
                let value = decode_value(buf, offset)?;
                map.insert(key, value);
            }
            Ok(Value::Map(map))
        }
        other => Err(ObjectNotationError::UnknownTag(other)),
    }
}

/// Decode a map payload directly (the top-level shape metadata sections use).
pub fn decode_map(buf: &[u8]) -> ObjResult<BTreeMap<String, Value>> {
    let mut offset = 0;
    match decode_value(buf, &mut offset)? {
        Value::Map(m) => Ok(m),
        other => {
            let mut map = BTreeMap::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

fn read_u8(buf: &[u8], offset: &mut usize) -> ObjResult<u8> {
    let b = *buf.get(*offset).ok_or(ObjectNotationError::Truncated)?;
    *offset += 1;
    Ok(b)
}

fn read_u64(buf: &[u8], offset: &mut usize) -> ObjResult<u64> {
    let end = offset.checked_add(8).ok_or(ObjectNotationError::Truncated)?;
    let bytes = buf.get(*offset..end).ok_or(ObjectNotationError::Truncated)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    *offset = end;
    Ok(u64::from_le_bytes(arr))
}

fn read_i64(buf: &[u8], offset: &mut usize) -> ObjResult<i64> {
    Ok(read_u64(buf, offset)? as i64)
}

fn read_f64(buf: &[u8], offset: &mut usize) -> ObjResult<f64> {
    Ok(f64::from_bits(read_u64(buf, offset)?))
}

fn read_bytes(buf: &[u8], offset: &mut usize) -> ObjResult<Vec<u8>> {
    let len = usize::try_from(read_u64(buf, offset)?).map_err(|_| ObjectNotationError::Truncated)?;
    let end = offset.checked_add(len).ok_or(ObjectNotationError::Truncated)?;
    let bytes = buf.get(*offset..end).ok_or(ObjectNotationError::Truncated)?.to_vec();
    *offset = end;
    Ok(bytes)
}

fn read_string(buf: &[u8], offset: &mut usize) -> ObjResult<String> {
    let bytes = read_bytes(buf, offset)?;
    String::from_utf8(bytes).map_err(|_| ObjectNotationError::InvalidUtf8)
}

/// Encode a value back to its object-notation bytes. Used by tests to build
/// fixture `.aif-bin` payloads deterministically.
pub fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(0),
        Value::Bool(b) => {
            out.push(1);
            out.push(*b as u8);
        }
        Value::Int(i) => {
            out.push(2);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            out.push(3);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::String(s) => {
            out.push(4);
            write_bytes(s.as_bytes(), out);
        }
        Value::Bytes(b) => {
            out.push(5);
            write_bytes(b, out);
        }
        Value::Array(items) => {
            out.push(6);
            out.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                encode_value(item, out);
            }
        }
        Value::Map(map) => {
            out.push(7);
            out.extend_from_slice(&(map.len() as u64).to_le_bytes());
            for (k, v) in map {
                write_bytes(k.as_bytes(), out);
                encode_value(v, out);
            }
        }
    }
}

fn write_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

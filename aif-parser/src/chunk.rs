//! Content-chunks section decoding (spec.md §4.1 step 6, §6.1).

use aif_model::{Metadata, Value};

use crate::object_notation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    Text,
    TableJson,
    Image,
    Audio,
    Video,
    Code,
    Other(u32),
}

impl ChunkType {
    pub fn from_u32(raw: u32) -> Self {
        match raw {
            1 => ChunkType::Text,
            2 => ChunkType::TableJson,
            3 => ChunkType::Image,
            4 => ChunkType::Audio,
            5 => ChunkType::Video,
            6 => ChunkType::Code,
            other => ChunkType::Other(other),
        }
    }
}

/// A single decoded chunk record, before the id-synthesis fallback and
/// indexer-added metadata are applied.
#[derive(Debug, Clone)]
pub struct ParsedChunk {
    pub chunk_type: ChunkType,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    /// `id` as read from the chunk's own metadata, if present.
    pub explicit_id: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChunkDecodeError {
    #[error("truncated chunk stream at index {index}")]
    Truncated { index: usize },
    #[error("chunk {index} metadata is malformed: {source}")]
    BadMetadata {
        index: usize,
        #[source]
        source: object_notation::ObjectNotationError,
    },
    #[error("chunk {index} data is not valid UTF-8")]
    InvalidUtf8 { index: usize },
}

/// Decode the content-chunks section payload: `u32 count` followed by
/// `count` records of `(u32 type, u64 data_len, u64 meta_len, meta, data)`.
///
/// Returns whatever chunks decoded successfully before the first failure,
/// plus that failure if one occurred (spec.md §4.1 step 8: partial results
/// are not discarded).
pub fn decode_chunks(buf: &[u8]) -> (Vec<ParsedChunk>, Option<ChunkDecodeError>) {
    let mut chunks = Vec::new();
    let mut offset = 0usize;

    let count = match read_u32(buf, &mut offset) {
        Some(c) => c as usize,
        None => return (chunks, Some(ChunkDecodeError::Truncated { index: 0 })),
    };

    for index in 0..count {
        match decode_one(buf, &mut offset, index) {
            Ok(chunk) => chunks.push(chunk),
            Err(err) => return (chunks, Some(err)),
        }
    }
    (chunks, None)
}

fn decode_one(buf: &[u8], offset: &mut usize, index: usize) -> Result<ParsedChunk, ChunkDecodeError> {
    let raw_type = read_u32(buf, offset).ok_or(ChunkDecodeError::Truncated { index })?;
    let data_length = read_u64(buf, offset).ok_or(ChunkDecodeError::Truncated { index })? as usize;
    let metadata_length = read_u64(buf, offset).ok_or(ChunkDecodeError::Truncated { index })? as usize;

    let meta_bytes = take(buf, offset, metadata_length).ok_or(ChunkDecodeError::Truncated { index })?;
    let data_bytes = take(buf, offset, data_length).ok_or(ChunkDecodeError::Truncated { index })?;

    let metadata = object_notation::decode_map(meta_bytes)
        .map_err(|source| ChunkDecodeError::BadMetadata { index, source })?;

    let chunk_type = ChunkType::from_u32(raw_type);
    let text = match chunk_type {
        ChunkType::Text | ChunkType::Code => {
            String::from_utf8(data_bytes.to_vec()).map_err(|_| ChunkDecodeError::InvalidUtf8 { index })?
        }
        ChunkType::TableJson => {
            let raw = std::str::from_utf8(data_bytes).map_err(|_| ChunkDecodeError::InvalidUtf8 { index })?;
            match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(value) => value.to_string(),
                Err(_) => String::new(),
            }
        }
        _ => String::new(),
    };

    let embedding = metadata
        .get("embedding")
        .and_then(Value::as_f32_seq)
        .unwrap_or_default();
    let explicit_id = metadata.get("id").and_then(Value::as_str).map(str::to_string);

    Ok(ParsedChunk {
        chunk_type,
        text,
        embedding,
        metadata,
        explicit_id,
    })
}

fn read_u32(buf: &[u8], offset: &mut usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let bytes = buf.get(*offset..end)?;
    let mut arr = [0u8; 4];
    arr.copy_from_slice(bytes);
    *offset = end;
    Some(u32::from_le_bytes(arr))
}

fn read_u64(buf: &[u8], offset: &mut usize) -> Option<u64> {
    let end = offset.checked_add(8)?;
    let bytes = buf.get(*offset..end)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    *offset = end;
    Some(u64::from_le_bytes(arr))
}

fn take<'a>(buf: &'a [u8], offset: &mut usize, len: usize) -> Option<&'a [u8]> {
    let end = offset.checked_add(len)?;
    let slice = buf.get(*offset..end)?;
    *offset = end;
    Some(slice)
}

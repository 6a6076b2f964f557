//! Decoder for the `.aif-bin` on-disk memory file format (spec.md §4.1, §6.1).

pub mod chunk;
pub mod header;
pub mod object_notation;

use std::fs;
use std::path::Path;

use aif_model::Metadata;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

pub use chunk::{ChunkDecodeError, ChunkType, ParsedChunk};
pub use header::Header;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("file is smaller than the {0}-byte fixed header")]
    TooSmall(usize),
    #[error("missing or invalid magic prefix")]
    BadMagic,
}

/// A chunk record after id synthesis, ready for the Indexer to turn into a
/// [`aif_model::MemoryChunk`].
#[derive(Debug, Clone)]
pub struct DecodedChunk {
    pub raw_id: String,
    pub chunk_type: ChunkType,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// The decoded contents of one `.aif-bin` file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub version: u32,
    pub metadata: Metadata,
    /// Set when the metadata section failed to decode; the map above is
    /// then empty rather than fatal (spec.md §4.1 step 5).
    pub metadata_decode_error: Option<String>,
    pub chunks: Vec<DecodedChunk>,
    /// Set when the chunk stream aborted early; `chunks` still holds
    /// whatever decoded successfully before that point.
    pub chunk_stream_error: Option<ChunkDecodeError>,
}

/// Decode a `.aif-bin` file from disk.
///
/// Determinism: the same bytes always produce the same [`ParsedFile`] (the
/// id-synthesis fallback is a pure function of `path`, chunk index, and
/// chunk text — see spec.md §9's open question on chunk-id source).
pub fn parse(path: &Path) -> Result<ParsedFile, ParseError> {
    let bytes = fs::read(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_bytes(&bytes, &path.display().to_string())
}

/// Decode already-loaded `.aif-bin` bytes. `source_label` feeds the
/// deterministic id-synthesis fallback and is normally the absolute path.
pub fn parse_bytes(buf: &[u8], source_label: &str) -> Result<ParsedFile, ParseError> {
    if buf.len() < header::HEADER_LEN {
        return Err(ParseError::TooSmall(header::HEADER_LEN));
    }
    let header = header::parse_header(buf).ok_or(ParseError::BadMagic)?;

    let (metadata, metadata_decode_error) = match header.offsets.metadata {
        Some(offset) => match header::read_section(buf, offset) {
            Some(payload) => match object_notation::decode_map(payload) {
                Ok(map) => (map, None),
                Err(err) => {
                    warn!(%source_label, error = %err, "metadata section failed to decode; continuing with empty map");
                    (Metadata::new(), Some(err.to_string()))
                }
            },
            None => {
                warn!(%source_label, "metadata section offset out of bounds");
                (Metadata::new(), Some("section out of bounds".to_string()))
            }
        },
        None => (Metadata::new(), None),
    };

    let (raw_chunks, chunk_stream_error) = match header.offsets.content_chunks {
        Some(offset) => match header::read_section(buf, offset) {
            Some(payload) => chunk::decode_chunks(payload),
            None => (Vec::new(), None),
        },
        None => (Vec::new(), None),
    };
    if let Some(err) = &chunk_stream_error {
        debug!(%source_label, error = %err, decoded = raw_chunks.len(), "chunk stream aborted early");
    }

    let chunks = raw_chunks
        .into_iter()
        .enumerate()
        .map(|(index, c)| {
            let raw_id = c
                .explicit_id
                .clone()
                .unwrap_or_else(|| synthesize_id(source_label, index, &c.text));
            DecodedChunk {
                raw_id,
                chunk_type: c.chunk_type,
                text: c.text,
                embedding: c.embedding,
                metadata: c.metadata,
            }
        })
        .collect();

    Ok(ParsedFile {
        version: header.version,
        metadata,
        metadata_decode_error,
        chunks,
        chunk_stream_error,
    })
}

/// Deterministic id fallback: `(source_file, chunk_index, sha256(text)[..16])`,
/// per spec.md §9's resolved open question.
fn synthesize_id(source_label: &str, chunk_index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_label.as_bytes());
    hasher.update(chunk_index.to_le_bytes());
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

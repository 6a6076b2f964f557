//! Directory ingestion of `.aif-bin` files into the Store (spec.md §4.3).

use std::path::Path;

use aif_model::{MemoryChunk, Value};
use aif_store::Store;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::errors::RecallResult;

pub struct Indexer<'a> {
    store: &'a mut Store,
}

impl<'a> Indexer<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// Walk `dir` for `*.aif-bin` files (recursive when `recursive`) and
    /// ingest each into `collection_name`, creating the collection on
    /// demand. One bad file is logged and skipped, never aborting the
    /// batch (spec.md §4.3 "Failure isolation").
    pub fn index_directory(
        &mut self,
        dir: &Path,
        collection_name: &str,
        recursive: bool,
    ) -> RecallResult<(usize, usize)> {
        let collection = match self.store.get_collection(collection_name)? {
            Some(c) => c,
            None => self.store.create_collection(collection_name, None)?,
        };

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut files_with_chunks = 0usize;
        let mut total_chunks = 0usize;

        for entry in WalkDir::new(dir).max_depth(max_depth).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("aif-bin") {
                continue;
            }

            match self.index_file(path, collection.id) {
                Ok(Some(count)) => {
                    files_with_chunks += 1;
                    total_chunks += count;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping .aif-bin file that failed to parse");
                }
            }
        }

        self.store.update_collection_stats(collection.id)?;
        Ok((files_with_chunks, total_chunks))
    }

    /// Parse and ingest one `.aif-bin` file. Returns the number of chunks
    /// inserted, or `None` if the file had no embeddable chunks (skipped).
    fn index_file(&mut self, path: &Path, collection_id: aif_model::Id) -> RecallResult<Option<usize>> {
        let source_file = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();

        let parsed = aif_parser::parse(path).map_err(|e| crate::errors::RecallError::Input(e.to_string()))?;

        let file_meta = std::fs::metadata(path).ok();
        let original_created_at = file_meta
            .as_ref()
            .and_then(|m| m.created().ok())
            .map(|t| chrono::DateTime::<Utc>::from(t).to_rfc3339());
        let original_modified_at = file_meta
            .as_ref()
            .and_then(|m| m.modified().ok())
            .map(|t| chrono::DateTime::<Utc>::from(t).to_rfc3339());

        // Idempotent re-ingestion: drop any chunks this source previously contributed.
        self.store.delete_chunks_by_source(&source_file)?;

        let now = Utc::now();
        let chunks: Vec<MemoryChunk> = parsed
            .chunks
            .into_iter()
            .filter(|c| !c.embedding.is_empty())
            .enumerate()
            .map(|(index, c)| {
                let mut metadata = c.metadata;
                metadata.insert("embedding_dim".to_string(), Value::Int(c.embedding.len() as i64));
                if let Some(created) = &original_created_at {
                    metadata.insert("original_created_at".to_string(), Value::String(created.clone()));
                }
                if let Some(modified) = &original_modified_at {
                    metadata.insert("original_modified_at".to_string(), Value::String(modified.clone()));
                }

                let id = Uuid::parse_str(&c.raw_id).unwrap_or_else(|_| deterministic_uuid(&c.raw_id));
                MemoryChunk {
                    id,
                    collection_id,
                    source_file: source_file.clone(),
                    chunk_index: index as i64,
                    text: c.text,
                    embedding: c.embedding,
                    metadata,
                    created_at: now,
                    updated_at: now,
                }
            })
            .collect();

        if chunks.is_empty() {
            return Ok(None);
        }

        let count = chunks.len();
        self.store.insert_chunks(&chunks)?;
        Ok(Some(count))
    }
}

/// A raw chunk id that isn't a valid UUID (e.g. the parser's synthesized hex
/// id) is mapped deterministically into UUID space so `Store`'s `Id` column
/// stays a true primary key.
fn deterministic_uuid(raw: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, raw.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aif_model::Value;
    use aif_parser::object_notation::encode_value;
    use aif_store::Store;
    use std::collections::BTreeMap;
    use std::fs;

    fn header_bytes() -> Vec<u8> {
        vec![0u8; aif_parser::header::HEADER_LEN]
    }

    fn write_aif_bin(path: &Path, chunks: &[(u32, Vec<u8>, BTreeMap<String, Value>)]) {
        let mut body = Vec::new();
        let chunks_offset = aif_parser::header::HEADER_LEN as u64 + body.len() as u64;

        let mut chunks_payload = Vec::new();
        chunks_payload.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
        for (chunk_type, data, meta) in chunks {
            let mut meta_payload = Vec::new();
            encode_value(&Value::Map(meta.clone()), &mut meta_payload);
            chunks_payload.extend_from_slice(&chunk_type.to_le_bytes());
            chunks_payload.extend_from_slice(&(data.len() as u64).to_le_bytes());
            chunks_payload.extend_from_slice(&(meta_payload.len() as u64).to_le_bytes());
            chunks_payload.extend_from_slice(&meta_payload);
            chunks_payload.extend_from_slice(data);
        }
        body.extend_from_slice(&(chunks_payload.len() as u64).to_le_bytes());
        body.extend_from_slice(&chunks_payload);

        let mut out = header_bytes();
        out[0..8].copy_from_slice(&aif_parser::header::MAGIC);
        out[8..12].copy_from_slice(&1u32.to_le_bytes());
        out[16..24].copy_from_slice(&aif_parser::header::ABSENT.to_le_bytes());
        out[24..32].copy_from_slice(&aif_parser::header::ABSENT.to_le_bytes());
        out[32..40].copy_from_slice(&chunks_offset.to_le_bytes());
        out[40..48].copy_from_slice(&aif_parser::header::ABSENT.to_le_bytes());
        out[48..56].copy_from_slice(&aif_parser::header::ABSENT.to_le_bytes());
        out[56..64].copy_from_slice(&aif_parser::header::ABSENT.to_le_bytes());
        out.extend_from_slice(&body);
        fs::write(path, out).unwrap();
    }

    fn embedding_meta(dim: usize) -> BTreeMap<String, Value> {
        let mut meta = BTreeMap::new();
        meta.insert(
            "embedding".to_string(),
            Value::Array((0..dim).map(|i| Value::Float(if i == 0 { 1.0 } else { 0.0 })).collect()),
        );
        meta
    }

    #[test]
    fn indexes_a_directory_of_aif_bin_files() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(db_dir.path().join("index.db")).unwrap();

        write_aif_bin(
            &dir.path().join("a.aif-bin"),
            &[(1, b"hello world".to_vec(), embedding_meta(3))],
        );
        write_aif_bin(
            &dir.path().join("b.aif-bin"),
            &[
                (1, b"first".to_vec(), embedding_meta(3)),
                (1, b"second".to_vec(), embedding_meta(3)),
            ],
        );

        let (files, chunks) = Indexer::new(&mut store).index_directory(dir.path(), "c1", false).unwrap();
        assert_eq!(files, 2);
        assert_eq!(chunks, 3);

        let collection = store.get_collection("c1").unwrap().unwrap();
        assert_eq!(collection.chunk_count, 3);
        assert_eq!(collection.file_count, 2);
    }

    #[test]
    fn reingesting_the_same_directory_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(db_dir.path().join("index.db")).unwrap();

        write_aif_bin(&dir.path().join("a.aif-bin"), &[(1, b"v1".to_vec(), embedding_meta(2))]);
        Indexer::new(&mut store).index_directory(dir.path(), "c1", false).unwrap();

        write_aif_bin(&dir.path().join("a.aif-bin"), &[(1, b"v2".to_vec(), embedding_meta(2))]);
        let (_, chunks) = Indexer::new(&mut store).index_directory(dir.path(), "c1", false).unwrap();
        assert_eq!(chunks, 1);

        let collection = store.get_collection("c1").unwrap().unwrap();
        let all = store.get_chunks_by_collection(collection.id).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text, "v2");
    }

    #[test]
    fn files_with_zero_length_embeddings_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(db_dir.path().join("index.db")).unwrap();

        write_aif_bin(&dir.path().join("empty.aif-bin"), &[(1, b"no vector".to_vec(), BTreeMap::new())]);

        let (files, chunks) = Indexer::new(&mut store).index_directory(dir.path(), "c1", false).unwrap();
        assert_eq!(files, 0);
        assert_eq!(chunks, 0);
    }

    #[test]
    fn a_corrupt_file_is_skipped_without_aborting_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(db_dir.path().join("index.db")).unwrap();

        fs::write(dir.path().join("bad.aif-bin"), vec![0u8; 10]).unwrap();
        write_aif_bin(&dir.path().join("good.aif-bin"), &[(1, b"ok".to_vec(), embedding_meta(2))]);

        let (files, chunks) = Indexer::new(&mut store).index_directory(dir.path(), "c1", false).unwrap();
        assert_eq!(files, 1);
        assert_eq!(chunks, 1);
    }
}

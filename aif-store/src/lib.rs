//! Persistent transactional storage for collections, chunks, and the
//! keyword inverted index (spec.md §4.2).

mod embedding_codec;
mod errors;
mod schema;

use std::path::{Path, PathBuf};

use aif_model::{Collection, Id, MemoryChunk, Metadata};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};
use uuid::Uuid;

pub use errors::{StoreError, StoreResult};
pub use schema::default_db_path;

const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5_000;

pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open (creating if absent) the store at `path`. A leading `~` is
    /// expanded to the user's home directory; parent directories are
    /// created as needed (spec.md §4.2).
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    pub fn open_with_busy_timeout(path: impl AsRef<Path>, busy_timeout_ms: u32) -> StoreResult<Self> {
        let (conn, expanded) = schema::open_connection(path.as_ref(), busy_timeout_ms)?;
        Ok(Self { conn, path: expanded })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ---- collections -----------------------------------------------------

    pub fn create_collection(&self, name: &str, description: Option<&str>) -> StoreResult<Collection> {
        if self.get_collection(name)?.is_some() {
            warn!(%name, "refusing to create collection: name already exists");
            return Err(StoreError::Duplicate(name.to_string()));
        }
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO collections (id, name, description, file_count, chunk_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, 0, ?4, ?4)",
            params![id.to_string(), name, description, now.to_rfc3339()],
        )?;
        Ok(Collection {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            file_count: 0,
            chunk_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_collection(&self, name: &str) -> StoreResult<Option<Collection>> {
        self.conn
            .query_row(
                "SELECT id, name, description, file_count, chunk_count, created_at, updated_at
                 FROM collections WHERE name = ?1",
                params![name],
                row_to_collection,
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn get_collection_by_id(&self, id: Id) -> StoreResult<Option<Collection>> {
        self.conn
            .query_row(
                "SELECT id, name, description, file_count, chunk_count, created_at, updated_at
                 FROM collections WHERE id = ?1",
                params![id.to_string()],
                row_to_collection,
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn list_collections(&self) -> StoreResult<Vec<Collection>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, file_count, chunk_count, created_at, updated_at
             FROM collections ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_collection)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Deletes the collection and cascades to its chunks. Returns whether a
    /// row was removed.
    pub fn delete_collection(&self, name: &str) -> StoreResult<bool> {
        let n = self.conn.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        if n > 0 {
            debug!(%name, "deleted collection, cascading to its chunks");
        }
        Ok(n > 0)
    }

    pub fn update_collection_stats(&self, id: Id) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE collections SET
                file_count = (SELECT COUNT(DISTINCT source_file) FROM chunks WHERE collection_id = ?1),
                chunk_count = (SELECT COUNT(*) FROM chunks WHERE collection_id = ?1),
                updated_at = ?2
             WHERE id = ?1",
            params![id.to_string(), now],
        )?;
        Ok(())
    }

    // ---- chunks ------------------------------------------------------------

    pub fn insert_chunk(&mut self, chunk: &MemoryChunk) -> StoreResult<()> {
        self.insert_chunks(std::slice::from_ref(chunk))
    }

    /// Inserts a batch inside one transaction; on any row failure the
    /// transaction aborts, leaving the store unchanged.
    pub fn insert_chunks(&mut self, chunks: &[MemoryChunk]) -> StoreResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for chunk in chunks {
            if let Err(err) = check_embedding_dimension(&tx, chunk.collection_id, chunk.embedding.len()) {
                warn!(chunk_id = %chunk.id, error = %err, "aborting batch insert: embedding dimension rejected");
                return Err(err);
            }
            let metadata_json = serde_json::to_string(&chunk.metadata)
                .map_err(|e| StoreError::Corrupt(format!("metadata for chunk {}: {e}", chunk.id)))?;
            tx.execute(
                "INSERT INTO chunks (id, collection_id, source_file, chunk_index, text, embedding, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    chunk.id.to_string(),
                    chunk.collection_id.to_string(),
                    chunk.source_file,
                    chunk.chunk_index,
                    chunk.text,
                    embedding_codec::to_bytes(&chunk.embedding),
                    metadata_json,
                    chunk.created_at.to_rfc3339(),
                    chunk.updated_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        debug!(count = chunks.len(), "committed chunk batch insert");
        Ok(())
    }

    pub fn get_chunk(&self, id: Id) -> StoreResult<Option<MemoryChunk>> {
        self.conn
            .query_row(&select_chunks_sql("WHERE id = ?1"), params![id.to_string()], row_to_chunk)
            .optional()
            .map_err(StoreError::from)
    }

    pub fn get_chunks_by_collection(&self, collection_id: Id) -> StoreResult<Vec<MemoryChunk>> {
        let mut stmt = self
            .conn
            .prepare(&select_chunks_sql("WHERE collection_id = ?1 ORDER BY source_file, chunk_index"))?;
        let rows = stmt.query_map(params![collection_id.to_string()], row_to_chunk)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn get_all_chunks(&self) -> StoreResult<Vec<MemoryChunk>> {
        let mut stmt = self.conn.prepare(&select_chunks_sql("ORDER BY source_file, chunk_index"))?;
        let rows = stmt.query_map([], row_to_chunk)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn get_chunks_by_source_file(&self, source_file: &str) -> StoreResult<Vec<MemoryChunk>> {
        let mut stmt = self
            .conn
            .prepare(&select_chunks_sql("WHERE source_file = ?1 ORDER BY chunk_index"))?;
        let rows = stmt.query_map(params![source_file], row_to_chunk)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn delete_chunk(&mut self, id: Id) -> StoreResult<bool> {
        let n = self.conn.execute("DELETE FROM chunks WHERE id = ?1", params![id.to_string()])?;
        Ok(n > 0)
    }

    pub fn delete_chunks_by_source(&mut self, source_file: &str) -> StoreResult<usize> {
        let n = self
            .conn
            .execute("DELETE FROM chunks WHERE source_file = ?1", params![source_file])?;
        Ok(n)
    }

    /// Grouped, name-ordered file listing: `(source_file, chunk_count)`.
    pub fn list_files(&self, collection_id: Option<Id>) -> StoreResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_file, COUNT(*) FROM chunks
             WHERE (?1 IS NULL OR collection_id = ?1)
             GROUP BY source_file ORDER BY source_file",
        )?;
        let id_param = collection_id.map(|id| id.to_string());
        let rows = stmt.query_map(params![id_param], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Keyword search over `chunks.text` via the FTS5 index. `query` is
    /// wrapped as a quoted phrase (internal `"` doubled to escape) so
    /// arbitrary free text is safe to pass through. Results are ordered by
    /// BM25 ascending (lower is better, per SQLite's FTS5 convention) and
    /// limited.
    pub fn keyword_search(
        &self,
        query: &str,
        collection_id: Option<Id>,
        limit: usize,
    ) -> StoreResult<Vec<(Id, f64)>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let phrase = format!("\"{}\"", query.replace('"', "\"\""));
        let id_param = collection_id.map(|id| id.to_string());
        let mut stmt = self.conn.prepare(
            "SELECT c.id, bm25(chunks_fts) AS rank
             FROM chunks_fts
             JOIN chunks c ON c.rowid = chunks_fts.rowid
             WHERE chunks_fts MATCH ?1
               AND (?2 IS NULL OR c.collection_id = ?2)
             ORDER BY rank ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![phrase, id_param, limit as i64], |row| {
            let id_str: String = row.get(0)?;
            let rank: f64 = row.get(1)?;
            Ok((id_str, rank))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id_str, rank) = row?;
            let id = Uuid::parse_str(&id_str)
                .map_err(|e| StoreError::Corrupt(format!("chunk id `{id_str}`: {e}")))?;
            out.push((id, rank));
        }
        Ok(out)
    }
}

/// Checks the per-collection embedding-length invariant against whatever
/// chunk (if any) is already stored for that collection.
fn check_embedding_dimension(conn: &Connection, collection_id: Id, len: usize) -> StoreResult<()> {
    if len == 0 {
        return Err(StoreError::DimensionMismatch { expected: 0, got: 0 });
    }
    let existing: Option<i64> = conn
        .query_row(
            "SELECT LENGTH(embedding) / 4 FROM chunks WHERE collection_id = ?1 LIMIT 1",
            params![collection_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(expected) = existing {
        if expected as usize != len {
            return Err(StoreError::DimensionMismatch {
                expected: expected as usize,
                got: len,
            });
        }
    }
    Ok(())
}

fn select_chunks_sql(tail: &str) -> String {
    format!(
        "SELECT id, collection_id, source_file, chunk_index, text, embedding, metadata, created_at, updated_at
         FROM chunks {tail}"
    )
}

fn row_to_collection(row: &rusqlite::Row) -> rusqlite::Result<Collection> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Collection {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        name: row.get(1)?,
        description: row.get(2)?,
        file_count: row.get(3)?,
        chunk_count: row.get(4)?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<MemoryChunk> {
    let id: String = row.get(0)?;
    let collection_id: String = row.get(1)?;
    let embedding_blob: Vec<u8> = row.get(5)?;
    let metadata_json: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
    Ok(MemoryChunk {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        collection_id: Uuid::parse_str(&collection_id).unwrap_or_default(),
        source_file: row.get(2)?,
        chunk_index: row.get(3)?,
        text: row.get(4)?,
        embedding: embedding_codec::from_bytes(&embedding_blob),
        metadata,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests;

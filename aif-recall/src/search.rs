//! Hybrid vector/keyword ranking over stored chunks (spec.md §4.5).

use std::collections::HashMap;

use aif_model::{Id, MemoryChunk};
use aif_store::Store;

use crate::errors::{RecallError, RecallResult};

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub collection: Option<String>,
    pub threshold: f32,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { collection: None, threshold: 0.0, limit: 10 }
    }
}

#[derive(Debug, Clone)]
pub struct HybridOptions {
    pub collection: Option<String>,
    pub threshold: f32,
    pub limit: usize,
    /// Weight on the vector score; `1.0` is pure vector (spec.md §4.5).
    pub hybrid_weight: f32,
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self { collection: None, threshold: 0.0, limit: 10, hybrid_weight: 0.7 }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: MemoryChunk,
    pub score: f32,
    pub vector_score: f32,
    pub keyword_score: f32,
}

pub struct SearchEngine<'a> {
    store: &'a Store,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn resolve_collection(&self, name: &Option<String>) -> RecallResult<Option<Id>> {
        match name {
            None => Ok(None),
            Some(name) => {
                let collection = self
                    .store
                    .get_collection(name)?
                    .ok_or_else(|| RecallError::UnknownCollection(name.clone()))?;
                Ok(Some(collection.id))
            }
        }
    }

    fn candidates(&self, collection_id: Option<Id>) -> RecallResult<Vec<MemoryChunk>> {
        Ok(match collection_id {
            Some(id) => self.store.get_chunks_by_collection(id)?,
            None => self.store.get_all_chunks()?,
        })
    }

    /// Pure vector ranking (spec.md §4.5 `search`).
    pub fn search(&self, q_vec: &[f32], options: &SearchOptions) -> RecallResult<Vec<SearchResult>> {
        let collection_id = self.resolve_collection(&options.collection)?;
        let candidates = self.candidates(collection_id)?;

        let mut scored = Vec::with_capacity(candidates.len());
        for chunk in candidates {
            if chunk.embedding.len() != q_vec.len() {
                return Err(RecallError::DimMismatch { expected: q_vec.len(), got: chunk.embedding.len() });
            }
            let score = cosine_similarity(q_vec, &chunk.embedding);
            if score >= options.threshold {
                scored.push(SearchResult { chunk, score, vector_score: score, keyword_score: 0.0 });
            }
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(options.limit);
        Ok(scored)
    }

    /// Fused vector+keyword ranking (spec.md §4.5 `hybrid`).
    pub fn hybrid(&self, q_vec: &[f32], q_text: &str, options: &HybridOptions) -> RecallResult<Vec<SearchResult>> {
        let collection_id = self.resolve_collection(&options.collection)?;
        let candidates = self.candidates(collection_id)?;

        let mut vector_scores: HashMap<Id, f32> = HashMap::new();
        let mut by_id: HashMap<Id, MemoryChunk> = HashMap::new();
        for chunk in candidates {
            if chunk.embedding.len() != q_vec.len() {
                return Err(RecallError::DimMismatch { expected: q_vec.len(), got: chunk.embedding.len() });
            }
            vector_scores.insert(chunk.id, cosine_similarity(q_vec, &chunk.embedding));
            by_id.insert(chunk.id, chunk);
        }

        let keyword_hits = self.store.keyword_search(q_text, collection_id, options.limit.saturating_mul(3))?;
        let keyword_scores = normalize_bm25(&keyword_hits);

        let mut ids: Vec<Id> = vector_scores.keys().copied().collect();
        for id in keyword_scores.keys() {
            if !vector_scores.contains_key(id) {
                ids.push(*id);
            }
        }

        let w = options.hybrid_weight;
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let vector_score = vector_scores.get(&id).copied().unwrap_or(0.0);
            let keyword_score = keyword_scores.get(&id).copied().unwrap_or(0.0);
            let score = w * vector_score + (1.0 - w) * keyword_score;
            if score < options.threshold {
                continue;
            }
            let chunk = match by_id.remove(&id) {
                Some(c) => c,
                None => match self.store.get_chunk(id)? {
                    Some(c) => c,
                    None => continue,
                },
            };
            results.push(SearchResult { chunk, score, vector_score, keyword_score });
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(options.limit);
        Ok(results)
    }

    /// Direct lookup; no scoring (spec.md §4.5 `recall`).
    pub fn recall(&self, id: Id) -> RecallResult<Option<MemoryChunk>> {
        Ok(self.store.get_chunk(id)?)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// BM25 is lower-is-better; remap into `[0, 1]` with best at 1.0 (spec.md §4.5 step 5).
fn normalize_bm25(hits: &[(Id, f64)]) -> HashMap<Id, f32> {
    if hits.is_empty() {
        return HashMap::new();
    }
    let min = hits.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = hits.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);
    let range = if max - min == 0.0 { 1.0 } else { max - min };
    hits.iter().map(|(id, raw)| (*id, (1.0 - (raw - min) / range) as f32)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn chunk(collection_id: Id, text: &str, embedding: Vec<f32>) -> MemoryChunk {
        let now = chrono::Utc::now();
        MemoryChunk {
            id: Uuid::new_v4(),
            collection_id,
            source_file: "/a.aif-bin".to_string(),
            chunk_index: 0,
            text: text.to_string(),
            embedding,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_a_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn search_ranks_by_similarity_descending() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("index.db")).unwrap();
        let c = store.create_collection("c1", None).unwrap();
        store.insert_chunk(&chunk(c.id, "close", vec![0.9, 0.1])).unwrap();
        store.insert_chunk(&chunk(c.id, "far", vec![0.1, 0.9])).unwrap();

        let engine = SearchEngine::new(&store);
        let opts = SearchOptions { collection: Some("c1".to_string()), threshold: 0.0, limit: 10 };
        let results = engine.search(&[1.0, 0.0], &opts).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "close");
    }

    #[test]
    fn search_against_an_unknown_collection_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("index.db")).unwrap();
        let engine = SearchEngine::new(&store);
        let opts = SearchOptions { collection: Some("missing".to_string()), ..Default::default() };
        let err = engine.search(&[1.0], &opts).unwrap_err();
        assert!(matches!(err, RecallError::UnknownCollection(_)));
    }

    #[test]
    fn search_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("index.db")).unwrap();
        let c = store.create_collection("c1", None).unwrap();
        store.insert_chunk(&chunk(c.id, "x", vec![1.0, 0.0])).unwrap();

        let engine = SearchEngine::new(&store);
        let opts = SearchOptions { collection: Some("c1".to_string()), ..Default::default() };
        let err = engine.search(&[1.0, 0.0, 0.0], &opts).unwrap_err();
        assert!(matches!(err, RecallError::DimMismatch { expected: 3, got: 2 }));
    }

    #[test]
    fn empty_corpus_returns_empty_results_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("index.db")).unwrap();
        store.create_collection("c1", None).unwrap();
        let engine = SearchEngine::new(&store);
        let opts = SearchOptions { collection: Some("c1".to_string()), ..Default::default() };
        assert!(engine.search(&[1.0], &opts).unwrap().is_empty());
    }

    #[test]
    fn hybrid_fuses_vector_and_keyword_scores() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("index.db")).unwrap();
        let c = store.create_collection("c1", None).unwrap();
        store.insert_chunk(&chunk(c.id, "apples and oranges", vec![1.0, 0.0])).unwrap();
        store.insert_chunk(&chunk(c.id, "just oranges", vec![0.0, 1.0])).unwrap();

        let engine = SearchEngine::new(&store);
        let opts = HybridOptions {
            collection: Some("c1".to_string()),
            threshold: 0.0,
            limit: 10,
            hybrid_weight: 0.5,
        };
        let results = engine.hybrid(&[1.0, 0.0], "apples", &opts).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.text, "apples and oranges");
    }

    #[test]
    fn recall_is_a_direct_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("index.db")).unwrap();
        let c = store.create_collection("c1", None).unwrap();
        let ch = chunk(c.id, "hello", vec![1.0]);
        store.insert_chunk(&ch).unwrap();

        let engine = SearchEngine::new(&store);
        assert_eq!(engine.recall(ch.id).unwrap().unwrap().text, "hello");
        assert!(engine.recall(Uuid::new_v4()).unwrap().is_none());
    }
}

//! Thin composition layer transports bind to directly (spec.md §4.6).

use aif_model::{Collection, Id, MemoryChunk};
use aif_embedder::Embedder;
use aif_store::Store;

use crate::errors::RecallResult;
use crate::indexer::Indexer;
use crate::search::{HybridOptions, SearchEngine, SearchOptions, SearchResult};

pub struct SearchRequest {
    pub query_text: String,
    /// A pre-computed query vector. When present, `search()` uses it directly
    /// and skips the Embedder call (spec.md §2, §6.3 `embedding?` body field).
    pub embedding: Option<Vec<f32>>,
    pub collection: Option<String>,
    pub threshold: f32,
    pub limit: usize,
    /// `None` means pure vector search; `Some(w)` runs the fused `hybrid` ranking.
    pub hybrid_weight: Option<f32>,
}

pub struct IndexDirectoryRequest {
    pub directory: std::path::PathBuf,
    pub collection: String,
    pub recursive: bool,
}

/// Facade over the Store/Embedder/SearchEngine/Indexer (spec.md §4.6). Each
/// operation takes a small option record; transports bind to these directly.
pub struct Facade<'a> {
    store: &'a mut Store,
    embedder: &'a dyn Embedder,
}

impl<'a> Facade<'a> {
    pub fn new(store: &'a mut Store, embedder: &'a dyn Embedder) -> Self {
        Self { store, embedder }
    }

    pub fn search(&mut self, request: SearchRequest) -> RecallResult<Vec<SearchResult>> {
        let q_vec = match &request.embedding {
            Some(v) => v.clone(),
            None => self.embedder.embed(&request.query_text)?,
        };
        let engine = SearchEngine::new(self.store);
        match request.hybrid_weight {
            Some(w) => {
                let opts = HybridOptions {
                    collection: request.collection,
                    threshold: request.threshold,
                    limit: request.limit,
                    hybrid_weight: w,
                };
                engine.hybrid(&q_vec, &request.query_text, &opts)
            }
            None => {
                let opts = SearchOptions {
                    collection: request.collection,
                    threshold: request.threshold,
                    limit: request.limit,
                };
                engine.search(&q_vec, &opts)
            }
        }
    }

    pub fn recall(&self, id: Id) -> RecallResult<Option<MemoryChunk>> {
        SearchEngine::new(self.store).recall(id)
    }

    pub fn list_collections(&self) -> RecallResult<Vec<Collection>> {
        Ok(self.store.list_collections()?)
    }

    pub fn index_directory(&mut self, request: IndexDirectoryRequest) -> RecallResult<(usize, usize)> {
        Indexer::new(self.store).index_directory(&request.directory, &request.collection, request.recursive)
    }
}

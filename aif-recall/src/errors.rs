use thiserror::Error;

/// Error taxonomy shared by the Indexer and the SearchEngine (spec.md §7).
/// Kinds are kept distinct rather than flattened so a transport can map
/// each one to the right envelope without losing information.
#[derive(Debug, Error)]
pub enum RecallError {
    #[error("input error: {0}")]
    Input(String),
    #[error("collection not found: {0}")]
    UnknownCollection(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimMismatch { expected: usize, got: usize },
    #[error(transparent)]
    Store(#[from] aif_store::StoreError),
    #[error(transparent)]
    Embed(#[from] aif_embedder::EmbedderError),
}

pub type RecallResult<T> = Result<T, RecallError>;

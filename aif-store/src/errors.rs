use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection `{0}` already exists")]
    Duplicate(String),
    #[error("embedding dimension mismatch in collection: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

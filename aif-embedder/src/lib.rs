//! The `Embedder` capability (spec.md §4.4): a pluggable text-to-vector
//! backend the core depends on through a trait, never a concrete model.

mod deterministic;
mod onnx;

pub use deterministic::DeterministicStubEmbedder;
pub use onnx::{ModelPreset, OnnxConfig, OnnxEmbedder};

use thiserror::Error;

/// Errors an embedder implementation can raise.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmbedderError {
    #[error("invalid embedder configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("input text exceeds max length of {max_length} tokens, actual length: {actual_length}")]
    InputTooLong { max_length: usize, actual_length: usize },
    #[error("provider failure: {message}")]
    ProviderFailure { message: String },
}

/// Contract the core depends on (spec.md §4.4): `embed`/`embed_batch` return
/// unit-normalized vectors of `dimension()` length. Re-entrant; the first
/// call may block on model acquisition, later calls block only on compute.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;
    fn dimension(&self) -> usize;
    fn model_id(&self) -> &str;
}

/// L2-normalize `v` in place; a zero vector is left as-is.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

//! Seeded-hash embedder (teacher's `OnnxHttpEmbedder`/`DeterministicEmbedderCore`
//! pattern, generalized): used by tests and by callers that don't want to
//! load a real model. `embed(t) == embed(t)` bitwise and `‖embed(t)‖₂ == 1`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::{l2_normalize, Embedder, EmbedderError};

/// A deterministic embedder seeded by a model id; produces unit-normalized
/// vectors with no real semantic content, suitable for tests and demos.
#[derive(Debug, Clone)]
pub struct DeterministicStubEmbedder {
    model_id: String,
    dimension: usize,
    max_input_length: usize,
    base_seed: u64,
}

impl DeterministicStubEmbedder {
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Result<Self, EmbedderError> {
        Self::with_max_input_length(model_id, dimension, 8192)
    }

    pub fn with_max_input_length(
        model_id: impl Into<String>,
        dimension: usize,
        max_input_length: usize,
    ) -> Result<Self, EmbedderError> {
        if dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        if max_input_length == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "max_input_length must be greater than zero".into(),
            });
        }
        let model_id = model_id.into();
        let mut hasher = DefaultHasher::new();
        model_id.hash(&mut hasher);
        dimension.hash(&mut hasher);
        Ok(Self {
            model_id,
            dimension,
            max_input_length,
            base_seed: hasher.finish(),
        })
    }

    fn validate_length(&self, text: &str) -> Result<(), EmbedderError> {
        let actual_length = text.chars().count();
        if actual_length > self.max_input_length {
            return Err(EmbedderError::InputTooLong {
                max_length: self.max_input_length,
                actual_length,
            });
        }
        Ok(())
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dimension);
        for index in 0..self.dimension {
            let mut hasher = DefaultHasher::new();
            self.base_seed.hash(&mut hasher);
            index.hash(&mut hasher);
            text.hash(&mut hasher);
            out.push(normalize_hash(hasher.finish()));
        }
        l2_normalize(&mut out);
        out
    }
}

impl Embedder for DeterministicStubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.validate_length(text)?;
        Ok(self.generate(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn normalize_hash(value: u64) -> f32 {
    const SCALE: f64 = 2.0;
    let normalized = (value as f64) / (u64::MAX as f64);
    (normalized * SCALE - 1.0) as f32
}

//! Real local inference via `ort` + `tokenizers` (spec.md §4.4): mean-pool
//! the token embeddings and L2-normalize. Model selected by short name
//! (`minilm` -> 384-dim, `mpnet` -> 768-dim), asset paths resolved relative
//! to this crate the way the teacher's `config::default_stdio_config` does.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use ndarray::Array2;
use ort::{session::Session, value::Tensor, Error as OrtError};
use tokenizers::{Encoding, Tokenizer};

use crate::{l2_normalize, Embedder, EmbedderError};

/// Short names for the bundled sentence-encoder family (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPreset {
    MiniLm,
    MpNet,
}

impl ModelPreset {
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "minilm" => Some(Self::MiniLm),
            "mpnet" => Some(Self::MpNet),
            _ => None,
        }
    }

    pub fn model_id(&self) -> &'static str {
        match self {
            Self::MiniLm => "minilm",
            Self::MpNet => "mpnet",
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::MiniLm => 384,
            Self::MpNet => 768,
        }
    }

    fn asset_dir(&self) -> &'static str {
        match self {
            Self::MiniLm => "models/minilm",
            Self::MpNet => "models/mpnet",
        }
    }
}

/// Configuration for a local ONNX embedder.
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub runtime_library_path: PathBuf,
    pub dimension: usize,
    pub max_input_length: usize,
    pub embedding_model_id: String,
}

impl OnnxConfig {
    /// Resolve the bundled defaults for `preset`, with asset paths relative
    /// to this crate's directory so callers work regardless of cwd.
    pub fn for_preset(preset: ModelPreset) -> Self {
        let base = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(preset.asset_dir());
        Self {
            model_path: base.join("model.onnx"),
            tokenizer_path: base.join("tokenizer.json"),
            runtime_library_path: Self::default_runtime_library_path(),
            dimension: preset.dimension(),
            max_input_length: 8192,
            embedding_model_id: preset.model_id().to_string(),
        }
    }

    #[cfg(target_os = "windows")]
    fn default_runtime_library_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("bin/onnxruntime.dll")
    }

    #[cfg(target_os = "macos")]
    fn default_runtime_library_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("bin/libonnxruntime.dylib")
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn default_runtime_library_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("bin/libonnxruntime.so")
    }
}

/// ONNX-based embedder that executes models through the ONNX Runtime shared
/// library, loaded dynamically (spec.md §4.4: "first use may block on model
/// acquisition; thereafter calls are fast").
#[derive(Debug)]
pub struct OnnxEmbedder {
    embedding_model_id: String,
    dimension: usize,
    session: Mutex<Session>,
    tokenizer: Arc<Tokenizer>,
    pad_id: i64,
    max_input_length: usize,
}

struct PreparedBatch {
    input_ids: Tensor<i64>,
    attention_mask: Tensor<i64>,
    attention_rows: Vec<Vec<i64>>,
}

static ORT_RUNTIME_PATH: OnceLock<PathBuf> = OnceLock::new();

impl OnnxEmbedder {
    pub fn new(config: OnnxConfig) -> Result<Self, EmbedderError> {
        if config.dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        if config.max_input_length == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "max_input_length must be greater than zero".into(),
            });
        }

        let runtime_library_path =
            resolve_existing_path(&config.runtime_library_path, "ONNX Runtime shared library")?;
        ensure_ort_initialized(&runtime_library_path)?;

        let model_path = resolve_existing_path(&config.model_path, "ONNX model")?;
        let tokenizer_path = resolve_existing_path(&config.tokenizer_path, "tokenizer config")?;

        let session = Session::builder()
            .map_err(|err| map_ort_error("create session builder", err))?
            .commit_from_file(&model_path)
            .map_err(|err| map_ort_error("load ONNX model", err))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| map_tokenizer_error("load tokenizer", err))?;

        let pad_id = tokenizer
            .token_to_id("<pad>")
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .ok_or_else(|| EmbedderError::InvalidConfiguration {
                message: format!(
                    "tokenizer `{}` does not declare a pad token",
                    tokenizer_path.display()
                ),
            })? as i64;

        Ok(Self {
            embedding_model_id: config.embedding_model_id,
            dimension: config.dimension,
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            pad_id,
            max_input_length: config.max_input_length,
        })
    }

    fn prepare_encodings(&self, texts: &[&str]) -> Result<Vec<Encoding>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = texts
            .iter()
            .map(|t| self.tokenizer.encode(*t, true))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| map_tokenizer_error("tokenize inputs", err))?;

        let max_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        if max_len > self.max_input_length {
            return Err(EmbedderError::InputTooLong {
                max_length: self.max_input_length,
                actual_length: max_len,
            });
        }
        Ok(encodings)
    }

    fn build_input_tensors(&self, encodings: &[Encoding]) -> Result<PreparedBatch, EmbedderError> {
        let batch = encodings.len();
        let seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);

        let mut input_ids = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_mask = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_rows = Vec::with_capacity(batch);

        for (row, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (col, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[(row, col)] = id as i64;
                attention_mask[(row, col)] = m as i64;
            }
            for col in ids.len()..seq_len {
                input_ids[(row, col)] = self.pad_id;
                attention_mask[(row, col)] = 0;
            }
            attention_rows.push((0..seq_len).map(|i| attention_mask[(row, i)]).collect::<Vec<i64>>());
        }

        let input_ids = Tensor::from_array(input_ids).map_err(|err| map_ort_error("prepare input_ids", err))?;
        let attention_mask =
            Tensor::from_array(attention_mask).map_err(|err| map_ort_error("prepare attention_mask", err))?;

        Ok(PreparedBatch { input_ids, attention_mask, attention_rows })
    }

    fn run_session(
        &self,
        input_ids: Tensor<i64>,
        attention_mask: Tensor<i64>,
    ) -> Result<(Vec<f32>, usize, usize, usize), EmbedderError> {
        let mut session = self.session.lock().unwrap();
        let outputs = session
            .run(ort::inputs![input_ids, attention_mask])
            .map_err(|err| map_ort_error("execute ONNX session", err))?;

        let output = &outputs[0];
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|err| map_ort_error("extract output tensor", err))?;

        if shape.len() != 3 {
            return Err(EmbedderError::ProviderFailure {
                message: format!("model output must be rank-3 [batch, seq_len, hidden], got shape {shape:?}"),
            });
        }

        let batch: usize = shape[0].try_into().unwrap();
        let seq_len: usize = shape[1].try_into().unwrap();
        let hidden: usize = shape[2].try_into().unwrap();
        Ok((data.to_vec(), batch, seq_len, hidden))
    }

    fn mean_pool(&self, data: &[f32], attention_rows: &[Vec<i64>], seq_len: usize, hidden: usize) -> Vec<Vec<f32>> {
        let batch = attention_rows.len();
        let mut results = Vec::with_capacity(batch);
        for (b, row) in attention_rows.iter().enumerate() {
            let mut sum = vec![0f32; hidden];
            let mut count = 0f32;
            for (t, &mask) in row.iter().enumerate().take(seq_len) {
                if mask == 1 {
                    let base = (b * seq_len + t) * hidden;
                    for h in 0..hidden {
                        sum[h] += data[base + h];
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                for h in sum.iter_mut() {
                    *h /= count;
                }
            }
            l2_normalize(&mut sum);
            results.push(sum);
        }
        results
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let encodings = self.prepare_encodings(&[text])?;
        let prepared = self.build_input_tensors(&encodings)?;
        let (raw_data, batch, seq_len, hidden) = self.run_session(prepared.input_ids, prepared.attention_mask)?;
        if batch != 1 {
            return Err(EmbedderError::ProviderFailure {
                message: format!("model returned unexpected batch size {batch}, expected 1 for single input"),
            });
        }
        let mut pooled = self.mean_pool(&raw_data, &prepared.attention_rows, seq_len, hidden);
        let vector = pooled.pop().ok_or_else(|| EmbedderError::ProviderFailure {
            message: "missing pooled output".into(),
        })?;
        if vector.len() != self.dimension {
            return Err(EmbedderError::ProviderFailure {
                message: format!(
                    "pooled embedding dimension {} does not match configured dimension {}",
                    vector.len(),
                    self.dimension
                ),
            });
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = self.prepare_encodings(texts)?;
        let prepared = self.build_input_tensors(&encodings)?;
        let expected_seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        let (raw_data, batch, seq_len_from_model, hidden) =
            self.run_session(prepared.input_ids, prepared.attention_mask)?;

        if batch != prepared.attention_rows.len() {
            return Err(EmbedderError::ProviderFailure {
                message: format!(
                    "model returned batch size {batch}, but prepared {} attention masks",
                    prepared.attention_rows.len()
                ),
            });
        }
        if seq_len_from_model != expected_seq_len {
            return Err(EmbedderError::ProviderFailure {
                message: format!("model returned sequence length {seq_len_from_model}, expected {expected_seq_len}"),
            });
        }

        Ok(self.mean_pool(&raw_data, &prepared.attention_rows, expected_seq_len, hidden))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.embedding_model_id
    }
}

fn ensure_ort_initialized(runtime_library_path: &Path) -> Result<(), EmbedderError> {
    if let Some(existing) = ORT_RUNTIME_PATH.get() {
        if !paths_equal(existing, runtime_library_path) {
            return Err(EmbedderError::InvalidConfiguration {
                message: format!(
                    "ONNX Runtime already initialized with library `{}`; cannot reinitialize with `{}`",
                    existing.display(),
                    runtime_library_path.display()
                ),
            });
        }
    } else {
        let _ = ORT_RUNTIME_PATH.set(runtime_library_path.to_path_buf());
    }

    ort::init_from(runtime_library_path.to_string_lossy().to_string())
        .map_err(|err| map_ort_load_error("load ONNX Runtime shared library", err))?
        .with_name("aifbin-recall")
        .commit();
    Ok(())
}

fn resolve_existing_path(path: &Path, description: &str) -> Result<PathBuf, EmbedderError> {
    fs::metadata(path).map_err(|_| EmbedderError::InvalidConfiguration {
        message: format!("{description} `{}` does not exist", path.display()),
    })?;
    path.canonicalize().map_err(|err| EmbedderError::ProviderFailure {
        message: format!("failed to canonicalize {description} `{}`: {err}", path.display()),
    })
}

fn map_ort_error(context: &str, err: OrtError) -> EmbedderError {
    EmbedderError::ProviderFailure { message: format!("{context} failed: {err}") }
}

fn map_ort_load_error(context: &str, err: ort::LoadDynamicError) -> EmbedderError {
    EmbedderError::ProviderFailure { message: format!("{context} failed: {err}") }
}

fn map_tokenizer_error(context: &str, err: tokenizers::Error) -> EmbedderError {
    EmbedderError::ProviderFailure { message: format!("{context} failed: {err}") }
}

fn paths_equal(a: &Path, b: &Path) -> bool {
    if let (Ok(a), Ok(b)) = (fs::canonicalize(a), fs::canonicalize(b)) {
        a == b
    } else {
        a == b
    }
}

//! Environment defaults and optional config file (spec.md §6.5).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn default_db_path() -> PathBuf {
    aif_store::default_db_path()
}

fn default_model() -> String {
    "minilm".to_string()
}

fn default_hybrid_weight() -> f32 {
    0.7
}

fn default_bind() -> String {
    "localhost:3847".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub model: String,
    pub hybrid_weight: f32,
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            model: default_model(),
            hybrid_weight: default_hybrid_weight(),
            bind: default_bind(),
        }
    }
}

impl Config {
    /// Load `~/.aifbin-recall/config.yaml`, falling back to defaults if the
    /// file is absent. A present-but-malformed file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aifbin-recall")
        .join("config.yaml")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

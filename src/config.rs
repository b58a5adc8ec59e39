//! Configuration parsing and validation.
//!
//! eduimg is configured via a TOML file (default: `config/eduimg.toml`).
//! Every section is optional; omitted keys take the defaults below.
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [artifacts]
//! bge_dir = "preprocess/bge/text_embedding"
//! clip_dir = "preprocess/clip/image_embedding"
//! lexical_dir = "preprocess/bm25/pickle_files"
//!
//! [lexical]
//! k1 = 1.5
//! b = 0.75
//! epsilon = 0.25
//!
//! [embedding]
//! provider = "local"
//! bge_model = "bge-small-en-v1.5"
//! clip_model = "clip-vit-b-32"
//!
//! [retrieval]
//! default_k = 1
//! fanout_timeout_secs = 0
//! ```
//!
//! # Validation
//!
//! [`load_config`] rejects out-of-range BM25 parameters, a `default_k` of
//! zero, and unknown provider or model names.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use eduimg_core::lexical::Bm25Params;
use eduimg_core::models::{EmbeddingFamily, StructureVariant};

use crate::embedding::known_model_dims;

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub lexical: LexicalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Directories the offline jobs wrote their artifacts to.
#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactsConfig {
    #[serde(default = "default_bge_dir")]
    pub bge_dir: PathBuf,
    #[serde(default = "default_clip_dir")]
    pub clip_dir: PathBuf,
    #[serde(default = "default_lexical_dir")]
    pub lexical_dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            bge_dir: default_bge_dir(),
            clip_dir: default_clip_dir(),
            lexical_dir: default_lexical_dir(),
        }
    }
}

fn default_bge_dir() -> PathBuf {
    PathBuf::from("preprocess/bge/text_embedding")
}
fn default_clip_dir() -> PathBuf {
    PathBuf::from("preprocess/clip/image_embedding")
}
fn default_lexical_dir() -> PathBuf {
    PathBuf::from("preprocess/bm25/pickle_files")
}

impl ArtifactsConfig {
    /// Index and metadata file for a vector backend.
    ///
    /// The BGE family keeps one pair per structure variant; CLIP has a
    /// single unified pair and ignores `variant`.
    pub fn vector_paths(
        &self,
        family: EmbeddingFamily,
        variant: Option<StructureVariant>,
    ) -> (PathBuf, PathBuf) {
        match family {
            EmbeddingFamily::Bge => {
                let n = variant.unwrap_or(StructureVariant::DEFAULT);
                (
                    self.bge_dir.join(format!("text_index_structure_{}.faiss", n)),
                    self.bge_dir.join(format!("text_metadata_structure_{}.json", n)),
                )
            }
            EmbeddingFamily::Clip => (
                self.clip_dir.join("clip_index.faiss"),
                self.clip_dir.join("clip_metadata.json"),
            ),
        }
    }

    /// Root under which `<flavor>/` lexical artifact directories live.
    pub fn lexical_root(&self) -> &Path {
        &self.lexical_dir
    }

    /// All configured artifact roots, labelled for display.
    pub fn roots(&self) -> [(&'static str, &Path); 3] {
        [
            ("bge", self.bge_dir.as_path()),
            ("clip", self.clip_dir.as_path()),
            ("bm25", self.lexical_dir.as_path()),
        ]
    }
}

/// BM25 hyperparameters used when an artifact does not carry its own.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LexicalConfig {
    #[serde(default = "default_k1")]
    pub k1: f64,
    #[serde(default = "default_b")]
    pub b: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            epsilon: default_epsilon(),
        }
    }
}

fn default_k1() -> f64 {
    1.5
}
fn default_b() -> f64 {
    0.75
}
fn default_epsilon() -> f64 {
    0.25
}

impl LexicalConfig {
    pub fn params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.k1,
            b: self.b,
            epsilon: self.epsilon,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_bge_model")]
    pub bge_model: String,
    #[serde(default = "default_clip_model")]
    pub clip_model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            bge_model: default_bge_model(),
            clip_model: default_clip_model(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_bge_model() -> String {
    "bge-small-en-v1.5".to_string()
}
fn default_clip_model() -> String {
    "clip-vit-b-32".to_string()
}

impl EmbeddingConfig {
    /// Model name configured for an embedding family.
    pub fn model_for(&self, family: EmbeddingFamily) -> &str {
        match family {
            EmbeddingFamily::Bge => &self.bge_model,
            EmbeddingFamily::Clip => &self.clip_model,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    /// Deadline for the whole fan-out, in seconds. `0` waits indefinitely.
    #[serde(default)]
    pub fanout_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            fanout_timeout_secs: 0,
        }
    }
}

fn default_k() -> usize {
    1
}

impl Config {
    /// Point every artifact directory under one root, using the layout the
    /// offline jobs write.
    pub fn with_artifact_root(mut self, root: &Path) -> Self {
        self.artifacts = ArtifactsConfig {
            bge_dir: root.join(default_bge_dir()),
            clip_dir: root.join(default_clip_dir()),
            lexical_dir: root.join(default_lexical_dir()),
        };
        self
    }
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the built-in defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "config file not found; using defaults");
        Ok(Config::default())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate lexical
    if config.lexical.k1.is_nan() || config.lexical.k1 < 0.0 {
        bail!("lexical.k1 must be >= 0");
    }
    if !(0.0..=1.0).contains(&config.lexical.b) {
        bail!("lexical.b must be in [0.0, 1.0]");
    }
    if config.lexical.epsilon.is_nan() || config.lexical.epsilon < 0.0 {
        bail!("lexical.epsilon must be >= 0");
    }

    // Validate retrieval
    if config.retrieval.default_k < 1 {
        bail!("retrieval.default_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local or disabled.",
            other
        ),
    }
    for family in [EmbeddingFamily::Bge, EmbeddingFamily::Clip] {
        let model = config.embedding.model_for(family);
        if known_model_dims(family, model).is_none() {
            bail!("Unknown {} embedding model: '{}'", family, model);
        }
    }

    Ok(())
}

//! Query embedding providers.
//!
//! Vector backends embed the query text with the same model the offline
//! job used to build their index. Two families are served:
//!
//! | Family | Default model | Dims |
//! |--------|---------------|------|
//! | BGE | `bge-small-en-v1.5` | 384 |
//! | CLIP | `clip-vit-b-32` (text tower) | 512 |
//!
//! The `local` provider runs the model in-process via fastembed (feature
//! `local-embeddings-fastembed`, on by default). Model files are downloaded
//! from Hugging Face on first use and cached; after that no network calls
//! are made. The `disabled` provider refuses to create embedders, so the
//! vector backends answer with empty results while lexical backends keep
//! working.

use std::sync::Arc;

use eduimg_core::embedding::Embedder;
use eduimg_core::models::EmbeddingFamily;
use eduimg_core::RetrievalError;

use crate::config::EmbeddingConfig;

/// Output dimensionality of a supported model, or `None` if the model is
/// not supported for `family`.
pub fn known_model_dims(family: EmbeddingFamily, name: &str) -> Option<usize> {
    match (family, name) {
        (EmbeddingFamily::Bge, "bge-small-en-v1.5") => Some(384),
        (EmbeddingFamily::Bge, "bge-base-en-v1.5") => Some(768),
        (EmbeddingFamily::Bge, "bge-large-en-v1.5") => Some(1024),
        (EmbeddingFamily::Clip, "clip-vit-b-32") => Some(512),
        _ => None,
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> eduimg_core::Result<fastembed::EmbeddingModel> {
    match name {
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "clip-vit-b-32" => Ok(fastembed::EmbeddingModel::ClipVitB32),
        other => Err(RetrievalError::Embedding(format!(
            "Unknown local embedding model: '{}'. Supported models: \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, clip-vit-b-32",
            other
        ))),
    }
}

/// Embedder for local inference through fastembed.
///
/// fastembed sessions need `&mut` access, so concurrent queries against the
/// same family take turns on the mutex.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    model: std::sync::Mutex<fastembed::TextEmbedding>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    /// Initialize the model, downloading it on first use.
    ///
    /// Blocking; call from a worker thread.
    pub fn new(family: EmbeddingFamily, config: &EmbeddingConfig) -> eduimg_core::Result<Self> {
        let model_name = config.model_for(family).to_string();
        let dims = known_model_dims(family, &model_name).ok_or_else(|| {
            RetrievalError::Embedding(format!(
                "model '{}' is not a {} embedding model",
                model_name, family
            ))
        })?;
        let fastembed_model = config_to_fastembed_model(&model_name)?;

        let started = std::time::Instant::now();
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
        )
        .map_err(|e| {
            RetrievalError::Embedding(format!(
                "Failed to initialize local embedding model: {}",
                e
            ))
        })?;
        tracing::info!(
            model = %model_name,
            family = %family,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded embedding model"
        );

        Ok(Self {
            model_name,
            dims,
            model: std::sync::Mutex::new(model),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> eduimg_core::Result<Vec<f32>> {
        let mut model = self
            .model
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| RetrievalError::Embedding(format!("Local embedding failed: {}", e)))?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding("Empty embedding response".to_string()))
    }
}

/// Create the query embedder for `family` based on configuration.
///
/// # Supported Providers
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
/// | `"disabled"` | none; always an error |
pub fn create_embedder(
    family: EmbeddingFamily,
    config: &EmbeddingConfig,
) -> eduimg_core::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(family, config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(RetrievalError::Embedding(
            "Local embedding provider requires --features local-embeddings-fastembed".to_string(),
        )),
        "disabled" => Err(RetrievalError::Embedding(format!(
            "Embedding provider is disabled; {} backend unavailable",
            family
        ))),
        other => Err(RetrievalError::Embedding(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_dims_per_family() {
        assert_eq!(known_model_dims(EmbeddingFamily::Bge, "bge-small-en-v1.5"), Some(384));
        assert_eq!(known_model_dims(EmbeddingFamily::Clip, "clip-vit-b-32"), Some(512));
        // Models are not interchangeable across families.
        assert_eq!(known_model_dims(EmbeddingFamily::Clip, "bge-small-en-v1.5"), None);
        assert_eq!(known_model_dims(EmbeddingFamily::Bge, "all-minilm-l6-v2"), None);
    }

    #[test]
    fn test_disabled_provider_refuses() {
        let config = EmbeddingConfig {
            provider: "disabled".to_string(),
            ..Default::default()
        };
        match create_embedder(EmbeddingFamily::Bge, &config) {
            Err(RetrievalError::Embedding(msg)) => assert!(msg.contains("disabled")),
            Err(other) => panic!("expected Embedding error, got {:?}", other),
            Ok(_) => panic!("disabled provider must not create an embedder"),
        }
    }
}

//! Retrieval facades over the lazily loaded backend handles.
//!
//! The four backends form a closed set ([`BackendKind`]). Each is served by
//! one [`Retriever`] implementation that knows how to query a loaded handle;
//! the [`Engine`] owns the handle registry and the [`HandleLoader`] that
//! builds handles on first use.
//!
//! # Result shapes
//!
//! | Request | BGE / BM25 | CLIP |
//! |---------|------------|------|
//! | variant pinned | `Single` | `Single` (unified index) |
//! | no variant | `PerVariant` over 1..=5 | `Single` (unified index) |
//!
//! # Error containment
//!
//! Caller errors (bad `k`) are returned. Any other failure while loading or
//! querying a handle is logged at error level with its key and turns into
//! an empty list for that variant, so one broken artifact never hides the
//! results of another.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, warn};

use eduimg_core::embedding::Embedder;
use eduimg_core::lexical::{Bm25Params, LexicalIndex};
use eduimg_core::models::{
    BackendKind, BackendResult, EmbeddingFamily, HandleKey, RankedDocument, StopwordFlavor,
    StructureVariant,
};
use eduimg_core::registry::LazyRegistry;
use eduimg_core::vector::VectorIndex;
use eduimg_core::{Result, RetrievalError};

use crate::config::{ArtifactsConfig, Config, EmbeddingConfig, RetrievalConfig};
use crate::embedding::create_embedder;

/// A loaded, read-only backend.
#[derive(Debug)]
pub enum BackendHandle {
    Vector(VectorIndex),
    Lexical(LexicalIndex),
}

impl BackendHandle {
    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        match self {
            BackendHandle::Vector(index) => index.len(),
            BackendHandle::Lexical(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds backend handles. Injected into the [`Engine`] so tests and
/// tooling can control where handles come from.
pub trait HandleLoader: Send + Sync {
    fn load_vector(
        &self,
        family: EmbeddingFamily,
        variant: Option<StructureVariant>,
    ) -> Result<VectorIndex>;

    fn load_lexical(&self, variant: StructureVariant, flavor: StopwordFlavor)
        -> Result<LexicalIndex>;

    fn embedder(&self, family: EmbeddingFamily) -> Result<Arc<dyn Embedder>>;
}

/// Loads handles from the artifact directories named in [`Config`].
pub struct ArtifactLoader {
    artifacts: ArtifactsConfig,
    params: Bm25Params,
    embedding: EmbeddingConfig,
    embedders: LazyRegistry<EmbeddingFamily, Arc<dyn Embedder>>,
    overrides: HashMap<EmbeddingFamily, Arc<dyn Embedder>>,
}

impl ArtifactLoader {
    pub fn new(config: &Config) -> Self {
        Self {
            artifacts: config.artifacts.clone(),
            params: config.lexical.params(),
            embedding: config.embedding.clone(),
            embedders: LazyRegistry::new(),
            overrides: HashMap::new(),
        }
    }

    /// Use `embedder` for `family` instead of the configured provider.
    pub fn with_embedder(mut self, family: EmbeddingFamily, embedder: Arc<dyn Embedder>) -> Self {
        self.overrides.insert(family, embedder);
        self
    }
}

impl HandleLoader for ArtifactLoader {
    fn load_vector(
        &self,
        family: EmbeddingFamily,
        variant: Option<StructureVariant>,
    ) -> Result<VectorIndex> {
        let (index_path, metadata_path) = self.artifacts.vector_paths(family, variant);
        let missing: Vec<_> = [&index_path, &metadata_path]
            .into_iter()
            .filter(|p| !p.is_file())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(RetrievalError::ArtifactNotFound {
                backend: BackendKind::vector(family).name().to_string(),
                tried: missing,
            });
        }

        // Artifacts first, so a missing index never triggers a model download.
        let embedder = self.embedder(family)?;
        VectorIndex::load(&index_path, &metadata_path, embedder)
    }

    fn load_lexical(
        &self,
        variant: StructureVariant,
        flavor: StopwordFlavor,
    ) -> Result<LexicalIndex> {
        LexicalIndex::load(self.artifacts.lexical_root(), variant, flavor, self.params)
    }

    fn embedder(&self, family: EmbeddingFamily) -> Result<Arc<dyn Embedder>> {
        if let Some(embedder) = self.overrides.get(&family) {
            return Ok(Arc::clone(embedder));
        }
        let shared = self
            .embedders
            .get_or_load(&family, || create_embedder(family, &self.embedding))?;
        Ok(Arc::clone(&*shared))
    }
}

/// Which handles of one backend are loaded.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub name: &'static str,
    pub has_variants: bool,
    pub loaded: bool,
    /// Loaded structure variants; empty for the unified CLIP index.
    pub loaded_variants: Vec<u8>,
}

/// Process-wide retrieval state: the handle registry and its loader.
pub struct Engine {
    loader: Box<dyn HandleLoader>,
    handles: LazyRegistry<HandleKey, BackendHandle>,
    default_k: usize,
    fanout_timeout: Option<Duration>,
}

impl Engine {
    /// Engine that loads from the configured artifact directories.
    pub fn new(config: &Config) -> Self {
        Self::with_loader(ArtifactLoader::new(config), &config.retrieval)
    }

    pub fn with_loader(loader: impl HandleLoader + 'static, retrieval: &RetrievalConfig) -> Self {
        Self {
            loader: Box::new(loader),
            handles: LazyRegistry::new(),
            default_k: retrieval.default_k,
            fanout_timeout: match retrieval.fanout_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn fanout_timeout(&self) -> Option<Duration> {
        self.fanout_timeout
    }

    /// Reject `k < 1`. Any larger `k` is valid; lists are cut at corpus size.
    pub fn validate_k(&self, k: usize) -> Result<usize> {
        if k < 1 {
            return Err(RetrievalError::invalid("k must be >= 1"));
        }
        Ok(k)
    }

    /// The handle for `key`, loading it on first use.
    ///
    /// Blocking; call from a worker thread.
    pub fn handle(&self, key: HandleKey) -> Result<Arc<BackendHandle>> {
        self.handles.get_or_load(&key, || {
            let started = Instant::now();
            let handle = match (key.backend.embedding_family(), key.backend.stopword_flavor()) {
                (Some(family), _) => {
                    BackendHandle::Vector(self.loader.load_vector(family, key.variant)?)
                }
                (None, Some(flavor)) => BackendHandle::Lexical(self.loader.load_lexical(
                    key.variant.unwrap_or(StructureVariant::DEFAULT),
                    flavor,
                )?),
                (None, None) => {
                    return Err(RetrievalError::invalid(format!("no loader for {}", key)))
                }
            };
            info!(
                key = %key,
                documents = handle.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "backend handle ready"
            );
            Ok(handle)
        })
    }

    /// Keys with a loaded handle, in backend then variant order.
    pub fn loaded_keys(&self) -> Vec<HandleKey> {
        let mut keys = self.handles.loaded_keys();
        keys.sort();
        keys
    }

    /// Load status of every backend.
    pub fn status(&self) -> Vec<BackendStatus> {
        let loaded = self.loaded_keys();
        BackendKind::ALL
            .iter()
            .map(|&kind| {
                let mine: Vec<&HandleKey> = loaded.iter().filter(|k| k.backend == kind).collect();
                BackendStatus {
                    name: kind.name(),
                    has_variants: kind.has_variants(),
                    loaded: !mine.is_empty(),
                    loaded_variants: mine.iter().filter_map(|k| k.variant.map(|v| v.get())).collect(),
                }
            })
            .collect()
    }

    /// Try to load every handle of every backend.
    ///
    /// Returns each key with its document count or the load error. Failed
    /// loads are not cached, so a later query retries them.
    pub fn warm(&self) -> Vec<(HandleKey, Result<usize>)> {
        BackendKind::ALL
            .iter()
            .flat_map(|kind| kind.handle_keys())
            .map(|key| (key, self.handle(key).map(|h| h.len())))
            .collect()
    }
}

/// Uniform query contract implemented once per backend.
pub trait Retriever: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Query a single handle. Errors here are contained by [`Retriever::top_k`].
    fn query_handle(
        &self,
        engine: &Engine,
        variant: Option<StructureVariant>,
        query: &str,
        k: usize,
    ) -> Result<Vec<RankedDocument>>;

    /// Top `k` documents, pinned to `variant` or across all variants.
    ///
    /// Only caller errors are returned; backend failures yield empty lists.
    fn top_k(
        &self,
        engine: &Engine,
        query: &str,
        k: usize,
        variant: Option<StructureVariant>,
    ) -> Result<BackendResult> {
        let k = engine.validate_k(k)?;
        let kind = self.kind();

        if !kind.has_variants() {
            return Ok(BackendResult::Single(self.contained(engine, None, query, k)?));
        }

        match variant {
            Some(v) => Ok(BackendResult::Single(self.contained(engine, Some(v), query, k)?)),
            None => {
                let mut per_variant = BTreeMap::new();
                for v in StructureVariant::ALL {
                    per_variant.insert(v.get(), self.contained(engine, Some(v), query, k)?);
                }
                Ok(BackendResult::PerVariant(per_variant))
            }
        }
    }

    /// One handle's results, with backend failures turned into an empty list.
    fn contained(
        &self,
        engine: &Engine,
        variant: Option<StructureVariant>,
        query: &str,
        k: usize,
    ) -> Result<Vec<RankedDocument>> {
        match self.query_handle(engine, variant, query, k) {
            Ok(docs) => Ok(docs),
            Err(e) if e.is_caller_error() => Err(e),
            Err(e) => {
                error!(
                    key = %HandleKey::new(self.kind(), variant),
                    error = %e,
                    "backend unavailable; returning empty result"
                );
                Ok(Vec::new())
            }
        }
    }
}

/// Dense retrieval over one embedding family.
#[derive(Debug, Clone, Copy)]
pub struct VectorRetriever(pub EmbeddingFamily);

impl Retriever for VectorRetriever {
    fn kind(&self) -> BackendKind {
        BackendKind::vector(self.0)
    }

    fn query_handle(
        &self,
        engine: &Engine,
        variant: Option<StructureVariant>,
        query: &str,
        k: usize,
    ) -> Result<Vec<RankedDocument>> {
        let key = HandleKey::new(self.kind(), variant.filter(|_| self.0.has_variants()));
        match &*engine.handle(key)? {
            BackendHandle::Vector(index) => index.top_k(query, k),
            BackendHandle::Lexical(_) => {
                warn!(key = %key, "expected a vector handle");
                Ok(Vec::new())
            }
        }
    }
}

/// BM25 retrieval over one stopword flavor.
#[derive(Debug, Clone, Copy)]
pub struct LexicalRetriever(pub StopwordFlavor);

impl Retriever for LexicalRetriever {
    fn kind(&self) -> BackendKind {
        BackendKind::lexical(self.0)
    }

    fn query_handle(
        &self,
        engine: &Engine,
        variant: Option<StructureVariant>,
        query: &str,
        k: usize,
    ) -> Result<Vec<RankedDocument>> {
        let key = HandleKey::new(
            self.kind(),
            Some(variant.unwrap_or(StructureVariant::DEFAULT)),
        );
        match &*engine.handle(key)? {
            BackendHandle::Lexical(index) => Ok(index.top_k(query, k)),
            BackendHandle::Vector(_) => {
                warn!(key = %key, "expected a lexical handle");
                Ok(Vec::new())
            }
        }
    }
}

/// The retriever serving `kind`.
pub fn retriever(kind: BackendKind) -> &'static dyn Retriever {
    match kind {
        BackendKind::Bge => &VectorRetriever(EmbeddingFamily::Bge),
        BackendKind::Clip => &VectorRetriever(EmbeddingFamily::Clip),
        BackendKind::Bm25WithStopwords => &LexicalRetriever(StopwordFlavor::WithStopwords),
        BackendKind::Bm25WithoutStopwords => &LexicalRetriever(StopwordFlavor::WithoutStopwords),
    }
}

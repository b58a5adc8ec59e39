//! Lexical retrieval: artifact loading and BM25 ranking.
//!
//! [`LexicalIndex::load`] turns whatever shape an offline job persisted
//! into one canonical structure: a fitted [`Bm25Model`] plus the metadata
//! sequence aligned with its corpus positions.
//!
//! # Normalization
//!
//! 1. Decode the artifact into an [`ArtifactShape`].
//! 2. Tokenize untokenized text (lower-case, whitespace split); keep token
//!    arrays as they are.
//! 3. Drop any document whose content is neither text nor tokens, together
//!    with its metadata entry, logging the rejection. An artifact where no
//!    document survives fails with the first rejection.
//! 4. Fit BM25 over the surviving corpus (prebuilt models are used as-is).

pub mod artifact;
pub mod bm25;

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{Result, RetrievalError};
use crate::metadata::MetadataStore;
use crate::models::{DocumentRecord, RankedDocument, StopwordFlavor, StructureVariant};

pub use artifact::{resolve_artifact, tokenize, ArtifactShape};
pub use bm25::{Bm25Model, Bm25Params};

/// A loaded lexical backend: ranking model plus aligned metadata.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    model: Bm25Model,
    metadata: Option<MetadataStore>,
    shape: &'static str,
}

impl LexicalIndex {
    /// Resolve, decode, and normalize the artifact for `(variant, flavor)`.
    pub fn load(
        root: &Path,
        variant: StructureVariant,
        flavor: StopwordFlavor,
        params: Bm25Params,
    ) -> Result<Self> {
        let path = resolve_artifact(root, variant, flavor)?;
        let started = Instant::now();
        let index = Self::from_path(&path, params)?;
        info!(
            path = %path.display(),
            shape = index.shape,
            documents = index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded lexical artifact"
        );
        Ok(index)
    }

    pub fn from_path(path: &Path, params: Bm25Params) -> Result<Self> {
        Self::from_shape(artifact::decode_artifact(path)?, params)
    }

    /// Normalize a decoded artifact into a ranking model.
    pub fn from_shape(shape: ArtifactShape, params: Bm25Params) -> Result<Self> {
        let shape_name = shape.name();
        match shape {
            ArtifactShape::Model { model, metadata } => {
                let params = Bm25Params {
                    k1: model.k1.unwrap_or(params.k1),
                    b: model.b.unwrap_or(params.b),
                    epsilon: model.epsilon.unwrap_or(params.epsilon),
                };
                let model = Bm25Model::from_parts(
                    params,
                    model.doc_freqs,
                    model.doc_len,
                    model.idf,
                    model.avgdl,
                )?;
                let metadata = metadata.map(MetadataStore::from_records);
                Self::assemble(model, metadata, shape_name)
            }
            ArtifactShape::Corpus { corpus, metadata } => {
                if let Some(meta) = &metadata {
                    if meta.len() != corpus.len() {
                        return Err(RetrievalError::MetadataMisaligned {
                            metadata: meta.len(),
                            index: corpus.len(),
                        });
                    }
                }
                let mut metadata = metadata.map(|m| m.into_iter().map(Some).collect::<Vec<_>>());
                let entries: Vec<(serde_json::Value, Option<DocumentRecord>)> = corpus
                    .into_iter()
                    .enumerate()
                    .map(|(i, content)| {
                        let record = metadata.as_mut().and_then(|m| m[i].take());
                        (content, record)
                    })
                    .collect();
                let (tokens, records) = normalize_entries(entries)?;
                let metadata = metadata.map(|_| MetadataStore::from_records(records));
                Self::assemble(Bm25Model::build(&tokens, params), metadata, shape_name)
            }
            ArtifactShape::Documents(docs) => {
                let entries = docs
                    .into_iter()
                    .map(|d| (d.content, Some(d.metadata.unwrap_or_default())))
                    .collect();
                let (tokens, records) = normalize_entries(entries)?;
                let metadata = Some(MetadataStore::from_records(records));
                Self::assemble(Bm25Model::build(&tokens, params), metadata, shape_name)
            }
        }
    }

    /// Build directly from a tokenized corpus.
    pub fn from_tokens(
        corpus: &[Vec<String>],
        metadata: Option<MetadataStore>,
        params: Bm25Params,
    ) -> Result<Self> {
        Self::assemble(Bm25Model::build(corpus, params), metadata, "tokens")
    }

    fn assemble(
        model: Bm25Model,
        metadata: Option<MetadataStore>,
        shape: &'static str,
    ) -> Result<Self> {
        if let Some(meta) = &metadata {
            meta.check_aligned(model.corpus_size())?;
        }
        Ok(Self {
            model,
            metadata,
            shape,
        })
    }

    pub fn model(&self) -> &Bm25Model {
        &self.model
    }

    pub fn metadata(&self) -> Option<&MetadataStore> {
        self.metadata.as_ref()
    }

    /// Name of the artifact shape this index was built from.
    pub fn shape(&self) -> &'static str {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.model.corpus_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `k` best `(position, score)` pairs for a raw query string.
    pub fn rank(&self, query: &str, k: usize) -> Vec<(usize, f64)> {
        let scores = self.model.score_all(&tokenize(query));
        select_top_k(&scores, k)
    }

    /// The `k` best documents for a raw query string.
    ///
    /// An index without metadata cannot name its documents, so it answers
    /// with an empty list.
    pub fn top_k(&self, query: &str, k: usize) -> Vec<RankedDocument> {
        let Some(metadata) = &self.metadata else {
            warn!(shape = self.shape, "lexical index has no aligned metadata; returning no results");
            return Vec::new();
        };

        self.rank(query, k)
            .into_iter()
            .filter_map(|(position, score)| match metadata.get(position) {
                Ok(record) => Some((position, score, record.clone())),
                Err(e) => {
                    debug!(error = %e, "dropping lexical hit");
                    None
                }
            })
            .enumerate()
            .map(|(rank, (position, score, record))| RankedDocument {
                rank,
                position,
                score: score as f32,
                record,
            })
            .collect()
    }
}

/// Tokenize every entry, dropping (and logging) the ones with bad content.
fn normalize_entries(
    entries: Vec<(serde_json::Value, Option<DocumentRecord>)>,
) -> Result<(Vec<Vec<String>>, Vec<DocumentRecord>)> {
    let total = entries.len();
    let mut tokens = Vec::with_capacity(total);
    let mut records = Vec::with_capacity(total);
    let mut first_rejection = None;

    for (position, (content, record)) in entries.into_iter().enumerate() {
        match artifact::content_tokens(position, &content) {
            Ok(t) => {
                tokens.push(t);
                records.push(record.unwrap_or_default());
            }
            Err(e) => {
                warn!(error = %e, "skipping lexical document");
                first_rejection.get_or_insert(e);
            }
        }
    }

    if tokens.is_empty() {
        if let Some(e) = first_rejection {
            return Err(e);
        }
    }
    Ok((tokens, records))
}

/// Indices of the `k` highest scores, ties broken by ascending position.
pub fn select_top_k(scores: &[f64], k: usize) -> Vec<(usize, f64)> {
    let mut ranked: Vec<(usize, f64)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

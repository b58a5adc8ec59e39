//! Lexical artifact resolution and shape decoding.
//!
//! Offline tokenizer runs have written lexical artifacts in three shapes
//! over time. The decoder tries each in a fixed order and returns the first
//! that matches:
//!
//! | Shape | Layout |
//! |-------|--------|
//! | [`ArtifactShape::Model`] | `{doc_freqs, doc_len, idf, avgdl?, k1?, b?, epsilon?, metadata?}` |
//! | [`ArtifactShape::Corpus`] | `{corpus: [text \| [token]], metadata?}` |
//! | [`ArtifactShape::Documents`] | `[{page_content: text \| [token], metadata}]` |
//!
//! Files ending in `.json` are read with serde_json; `.pkl` / `.pickle`
//! files are read with serde-pickle, which covers the plain list-and-dict
//! pickles the tokenizer writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, RetrievalError};
use crate::models::{BackendKind, DocumentRecord, StopwordFlavor, StructureVariant};

/// Extensions probed for every candidate artifact stem, in order.
pub const ARTIFACT_EXTENSIONS: [&str; 2] = ["json", "pkl"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawArtifact {
    Model(RawModel),
    Corpus(RawCorpus),
    Documents(Vec<RawDocument>),
}

#[derive(Debug, Deserialize)]
struct RawModel {
    doc_freqs: Vec<HashMap<String, u32>>,
    doc_len: Vec<usize>,
    idf: HashMap<String, f64>,
    #[serde(default)]
    avgdl: Option<f64>,
    #[serde(default)]
    k1: Option<f64>,
    #[serde(default)]
    b: Option<f64>,
    #[serde(default)]
    epsilon: Option<f64>,
    #[serde(default)]
    metadata: Option<Vec<DocumentRecord>>,
}

#[derive(Debug, Deserialize)]
struct RawCorpus {
    corpus: Vec<Value>,
    #[serde(default)]
    metadata: Option<Vec<DocumentRecord>>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    page_content: Value,
    #[serde(default)]
    metadata: Option<DocumentRecord>,
}

/// A prebuilt ranking model as persisted by an offline fit.
#[derive(Debug, Clone)]
pub struct PersistedModel {
    pub doc_freqs: Vec<HashMap<String, u32>>,
    pub doc_len: Vec<usize>,
    pub idf: HashMap<String, f64>,
    pub avgdl: Option<f64>,
    pub k1: Option<f64>,
    pub b: Option<f64>,
    pub epsilon: Option<f64>,
}

/// One document's content before tokenization.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub content: Value,
    pub metadata: Option<DocumentRecord>,
}

/// The decoded artifact, discriminated by the shape that matched.
#[derive(Debug, Clone)]
pub enum ArtifactShape {
    Model {
        model: PersistedModel,
        metadata: Option<Vec<DocumentRecord>>,
    },
    Corpus {
        corpus: Vec<Value>,
        metadata: Option<Vec<DocumentRecord>>,
    },
    Documents(Vec<DocumentEntry>),
}

impl ArtifactShape {
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactShape::Model { .. } => "model",
            ArtifactShape::Corpus { .. } => "corpus",
            ArtifactShape::Documents(_) => "documents",
        }
    }
}

impl From<RawArtifact> for ArtifactShape {
    fn from(raw: RawArtifact) -> Self {
        match raw {
            RawArtifact::Model(m) => ArtifactShape::Model {
                model: PersistedModel {
                    doc_freqs: m.doc_freqs,
                    doc_len: m.doc_len,
                    idf: m.idf,
                    avgdl: m.avgdl,
                    k1: m.k1,
                    b: m.b,
                    epsilon: m.epsilon,
                },
                metadata: m.metadata,
            },
            RawArtifact::Corpus(c) => ArtifactShape::Corpus {
                corpus: c.corpus,
                metadata: c.metadata,
            },
            RawArtifact::Documents(docs) => ArtifactShape::Documents(
                docs.into_iter()
                    .map(|d| DocumentEntry {
                        content: d.page_content,
                        metadata: d.metadata,
                    })
                    .collect(),
            ),
        }
    }
}

/// Candidate artifact paths for a variant, most specific first.
///
/// The variant-specific stem `<flavor>_structure_<n>` comes before the
/// flavor default `<flavor>` (built from structure 1).
pub fn artifact_candidates(
    root: &Path,
    variant: StructureVariant,
    flavor: StopwordFlavor,
) -> Vec<PathBuf> {
    let dir = root.join(flavor.as_str());
    let stems = [
        format!("{}_structure_{}", flavor.as_str(), variant),
        flavor.as_str().to_string(),
    ];
    stems
        .iter()
        .flat_map(|stem| {
            ARTIFACT_EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{}.{}", stem, ext)))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Find the artifact for `(variant, flavor)`, falling back to the flavor default.
pub fn resolve_artifact(
    root: &Path,
    variant: StructureVariant,
    flavor: StopwordFlavor,
) -> Result<PathBuf> {
    let tried = artifact_candidates(root, variant, flavor);
    if let Some(found) = tried.iter().find(|p| p.is_file()) {
        return Ok(found.clone());
    }
    Err(RetrievalError::ArtifactNotFound {
        backend: BackendKind::lexical(flavor).name().to_string(),
        tried,
    })
}

/// Read and decode an artifact file.
pub fn decode_artifact(path: &Path) -> Result<ArtifactShape> {
    let bytes = std::fs::read(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let value: Value = match ext.as_str() {
        "pkl" | "pickle" => serde_pickle::from_slice(&bytes, serde_pickle::DeOptions::new())
            .map_err(|e| RetrievalError::corrupt(path, e))?,
        _ => serde_json::from_slice(&bytes).map_err(|e| RetrievalError::corrupt(path, e))?,
    };

    decode_value(value)
}

/// Decode an already-parsed artifact value.
pub fn decode_value(value: Value) -> Result<ArtifactShape> {
    RawArtifact::deserialize(value)
        .map(ArtifactShape::from)
        .map_err(|_| RetrievalError::UnsupportedDocumentShape {
            position: 0,
            detail: "artifact matches none of the model, corpus, or document-list shapes"
                .to_string(),
        })
}

/// Lower-case and split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Tokens for one document's content.
///
/// Text is tokenized; a token array is taken as-is.
pub fn content_tokens(position: usize, content: &Value) -> Result<Vec<String>> {
    match content {
        Value::String(text) => Ok(tokenize(text)),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(token) => Ok(token.clone()),
                other => Err(RetrievalError::UnsupportedDocumentShape {
                    position,
                    detail: format!("token sequence contains {}", json_kind(other)),
                }),
            })
            .collect(),
        other => Err(RetrievalError::UnsupportedDocumentShape {
            position,
            detail: format!("content is {}, expected text or tokens", json_kind(other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

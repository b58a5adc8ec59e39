//! Core data models used throughout eduimg.
//!
//! These types describe the documents the offline jobs indexed, the keys
//! that identify a loaded backend, and the result shapes the query layer
//! returns.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Attribute record for one indexed image.
///
/// A record has no identity of its own: it is addressed by its position in
/// a metadata sequence, which must line up with the paired index row.
/// Fields the offline jobs wrote but this struct does not name are kept in
/// `extra` and serialized back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
    #[serde(default, alias = "source_url", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_mapped_image_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_free_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic_definition: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Which combination of a document's text fields an index was built from.
///
/// | Variant | Text |
/// |---------|------|
/// | 1 | context-free description |
/// | 2 | topic-mapped description |
/// | 3 | topic + subtopic definitions |
/// | 4 | definitions + context-free description |
/// | 5 | definitions + topic-mapped description |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StructureVariant(u8);

impl StructureVariant {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub const ALL: [StructureVariant; 5] = [
        StructureVariant(1),
        StructureVariant(2),
        StructureVariant(3),
        StructureVariant(4),
        StructureVariant(5),
    ];

    /// Variant used when a variant-specific artifact is missing.
    pub const DEFAULT: StructureVariant = StructureVariant(1);

    pub fn new(n: i64) -> Result<Self> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&n) {
            Ok(StructureVariant(n as u8))
        } else {
            Err(RetrievalError::invalid(format!(
                "structure variant must be in {}..={}, got {}",
                Self::MIN,
                Self::MAX,
                n
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for StructureVariant {
    type Error = RetrievalError;

    fn try_from(n: i64) -> Result<Self> {
        StructureVariant::new(n)
    }
}

impl fmt::Display for StructureVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stopword handling the lexical artifact was tokenized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StopwordFlavor {
    WithStopwords,
    WithoutStopwords,
}

impl StopwordFlavor {
    pub const ALL: [StopwordFlavor; 2] =
        [StopwordFlavor::WithStopwords, StopwordFlavor::WithoutStopwords];

    /// Directory and file stem used by the offline tokenizer.
    pub fn as_str(self) -> &'static str {
        match self {
            StopwordFlavor::WithStopwords => "with_stopwords",
            StopwordFlavor::WithoutStopwords => "without_stopwords",
        }
    }
}

impl FromStr for StopwordFlavor {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "with_stopwords" => Ok(StopwordFlavor::WithStopwords),
            "without_stopwords" => Ok(StopwordFlavor::WithoutStopwords),
            other => Err(RetrievalError::invalid(format!(
                "unknown stopword flavor '{}'. Use with_stopwords or without_stopwords.",
                other
            ))),
        }
    }
}

impl fmt::Display for StopwordFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding model family behind a vector backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EmbeddingFamily {
    /// Text embeddings, one index per structure variant.
    Bge,
    /// Text tower of an image/text model, one unified image index.
    Clip,
}

impl EmbeddingFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            EmbeddingFamily::Bge => "bge",
            EmbeddingFamily::Clip => "clip",
        }
    }

    pub fn has_variants(self) -> bool {
        matches!(self, EmbeddingFamily::Bge)
    }
}

impl fmt::Display for EmbeddingFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of retrieval backends the aggregator fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    Bge,
    Clip,
    Bm25WithStopwords,
    Bm25WithoutStopwords,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Bge,
        BackendKind::Clip,
        BackendKind::Bm25WithStopwords,
        BackendKind::Bm25WithoutStopwords,
    ];

    /// Stable name used as the key in query responses.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Bge => "bge",
            BackendKind::Clip => "clip",
            BackendKind::Bm25WithStopwords => "bm25_with_stopwords",
            BackendKind::Bm25WithoutStopwords => "bm25_without_stopwords",
        }
    }

    pub fn embedding_family(self) -> Option<EmbeddingFamily> {
        match self {
            BackendKind::Bge => Some(EmbeddingFamily::Bge),
            BackendKind::Clip => Some(EmbeddingFamily::Clip),
            _ => None,
        }
    }

    pub fn stopword_flavor(self) -> Option<StopwordFlavor> {
        match self {
            BackendKind::Bm25WithStopwords => Some(StopwordFlavor::WithStopwords),
            BackendKind::Bm25WithoutStopwords => Some(StopwordFlavor::WithoutStopwords),
            _ => None,
        }
    }

    pub fn lexical(flavor: StopwordFlavor) -> Self {
        match flavor {
            StopwordFlavor::WithStopwords => BackendKind::Bm25WithStopwords,
            StopwordFlavor::WithoutStopwords => BackendKind::Bm25WithoutStopwords,
        }
    }

    pub fn vector(family: EmbeddingFamily) -> Self {
        match family {
            EmbeddingFamily::Bge => BackendKind::Bge,
            EmbeddingFamily::Clip => BackendKind::Clip,
        }
    }

    /// Whether this backend keeps one index per structure variant.
    pub fn has_variants(self) -> bool {
        self != BackendKind::Clip
    }

    /// Registry keys this backend uses in all-variants mode.
    pub fn handle_keys(self) -> Vec<HandleKey> {
        if self.has_variants() {
            StructureVariant::ALL
                .iter()
                .map(|v| HandleKey::new(self, Some(*v)))
                .collect()
        } else {
            vec![HandleKey::new(self, None)]
        }
    }
}

impl FromStr for BackendKind {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        BackendKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| RetrievalError::invalid(format!("unknown backend '{}'", s)))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies one loaded backend handle in the registry.
///
/// `variant` is `None` only for backends with a single unified index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleKey {
    pub backend: BackendKind,
    pub variant: Option<StructureVariant>,
}

impl HandleKey {
    pub fn new(backend: BackendKind, variant: Option<StructureVariant>) -> Self {
        Self { backend, variant }
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            Some(v) => write!(f, "{}/structure_{}", self.backend, v),
            None => write!(f, "{}", self.backend),
        }
    }
}

/// One ranked result item.
///
/// Only the record is serialized, so a response list reads exactly like
/// the offline metadata file it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDocument {
    /// Zero-based position in the result list.
    #[serde(skip)]
    pub rank: usize,
    /// Position of the document in the backend's metadata sequence.
    #[serde(skip)]
    pub position: usize,
    /// Backend-specific score: BM25 score, or L2 distance for vector search.
    #[serde(skip)]
    pub score: f32,
    #[serde(flatten)]
    pub record: DocumentRecord,
}

/// A backend's answer to one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BackendResult {
    /// A single ordered list (pinned variant or unified index).
    Single(Vec<RankedDocument>),
    /// One ordered list per structure variant.
    PerVariant(BTreeMap<u8, Vec<RankedDocument>>),
}

impl BackendResult {
    /// The empty answer in the shape the backend normally returns.
    pub fn empty_for(kind: BackendKind) -> Self {
        if kind.has_variants() {
            BackendResult::PerVariant(
                StructureVariant::ALL
                    .iter()
                    .map(|v| (v.get(), Vec::new()))
                    .collect(),
            )
        } else {
            BackendResult::Single(Vec::new())
        }
    }

    /// Total number of items across all lists.
    pub fn total_len(&self) -> usize {
        match self {
            BackendResult::Single(items) => items.len(),
            BackendResult::PerVariant(map) => map.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_range() {
        assert!(StructureVariant::new(1).is_ok());
        assert!(StructureVariant::new(5).is_ok());
        assert!(StructureVariant::new(0).is_err());
        let err = StructureVariant::new(9).unwrap_err();
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_backend_names_round_trip() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.name().parse::<BackendKind>().unwrap(), kind);
        }
        assert!("tfidf".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_flavor_parse() {
        assert_eq!(
            "without_stopwords".parse::<StopwordFlavor>().unwrap(),
            StopwordFlavor::WithoutStopwords
        );
        assert!("some_stopwords".parse::<StopwordFlavor>().is_err());
    }

    #[test]
    fn test_clip_has_single_key() {
        assert_eq!(BackendKind::Clip.handle_keys(), vec![HandleKey::new(BackendKind::Clip, None)]);
        assert_eq!(BackendKind::Bge.handle_keys().len(), 5);
    }

    #[test]
    fn test_record_preserves_unknown_fields() {
        let json = r#"{"topic":"Physics","source_url":"http://x/img.png","grade":7}"#;
        let record: DocumentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.image_url.as_deref(), Some("http://x/img.png"));
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["grade"], 7);
        assert_eq!(back["topic"], "Physics");
    }

    #[test]
    fn test_result_shapes_serialize() {
        let doc = RankedDocument {
            rank: 0,
            position: 4,
            score: 1.5,
            record: DocumentRecord {
                topic: Some("Force".to_string()),
                ..Default::default()
            },
        };
        let single = serde_json::to_value(BackendResult::Single(vec![doc])).unwrap();
        assert_eq!(single, serde_json::json!([{"topic": "Force"}]));

        let empty = serde_json::to_value(BackendResult::empty_for(BackendKind::Bge)).unwrap();
        assert_eq!(empty["3"], serde_json::json!([]));
        assert!(BackendResult::empty_for(BackendKind::Bm25WithStopwords).is_empty());
    }
}

//! Error taxonomy shared by every retrieval backend.
//!
//! Errors fall into two groups. Caller errors ([`RetrievalError::InvalidQueryParameter`])
//! propagate to whoever issued the query. Everything else describes a broken
//! or missing artifact and is contained by the backend that hit it: the
//! facade logs it and answers with an empty result.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("artifact not found for {backend}: tried {}", display_paths(.tried))]
    ArtifactNotFound { backend: String, tried: Vec<PathBuf> },

    #[error("unsupported document shape at position {position}: {detail}")]
    UnsupportedDocumentShape { position: usize, detail: String },

    #[error("dimension mismatch: index expects {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid query parameter: {0}")]
    InvalidQueryParameter(String),

    #[error("position {position} out of range for metadata of length {len}")]
    IndexOutOfRange { position: usize, len: usize },

    #[error("metadata has {metadata} records but the index holds {index} entries")]
    MetadataMisaligned { metadata: usize, index: usize },

    #[error("corrupt artifact {}: {detail}", .path.display())]
    CorruptArtifact { path: PathBuf, detail: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// True for errors caused by the request itself rather than by backend state.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, RetrievalError::InvalidQueryParameter(_))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        RetrievalError::InvalidQueryParameter(message.into())
    }

    pub fn corrupt(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        RetrievalError::CorruptArtifact {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

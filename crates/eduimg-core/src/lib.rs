//! # eduimg Core
//!
//! Shared retrieval logic for eduimg: document models, the error taxonomy,
//! the positional metadata store, lexical artifact decoding with BM25
//! ranking, flat L2 vector search, the embedder trait, and the lazily
//! populated backend registry.
//!
//! This crate contains no async runtime, HTTP, or model-inference
//! dependencies. Everything here is synchronous and is driven from worker
//! threads by the `eduimg` application crate.

pub mod embedding;
pub mod error;
pub mod lexical;
pub mod metadata;
pub mod models;
pub mod registry;
pub mod vector;

pub use error::{Result, RetrievalError};

//! # eduimg
//!
//! Multi-backend retrieval service that maps free-text queries to
//! educational images.
//!
//! Offline jobs index the same image corpus four ways: dense BGE text
//! embeddings (five structure variants), a unified CLIP image index, and
//! BM25 over two tokenizations (with and without stopwords, five structure
//! variants each). eduimg loads those artifacts lazily, queries all of them
//! concurrently, and returns each backend's ranked metadata side by side.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐
//!  GET /get-images ─▶ aggregate  │── spawn_blocking × 4
//!                └──────┬───────┘
//!          ┌────────────┼─────────────┬──────────────┐
//!          ▼            ▼             ▼              ▼
//!        bge          clip    bm25_with_stop  bm25_without_stop
//!          └────────────┴──────┬──────┴──────────────┘
//!                              ▼
//!                  Engine: LazyRegistry<HandleKey, BackendHandle>
//!                              ▼
//!                  FAISS flat L2 / BM25 artifacts on disk
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! eduimg check                         # load every handle, report status
//! eduimg query "force" --k 2           # fan-out query, JSON to stdout
//! eduimg serve --warm                  # HTTP API on [server].bind
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Query embedders (fastembed) |
//! | [`backends`] | Handle loading and per-backend retrieval |
//! | [`aggregate`] | Concurrent fan-out |
//! | [`server`] | HTTP API |
//! | [`check`] | Handle status report |
//! | [`inventory`] | Artifact file inventory |

pub mod aggregate;
pub mod backends;
pub mod check;
pub mod config;
pub mod embedding;
pub mod inventory;
pub mod server;

pub use eduimg_core as core;

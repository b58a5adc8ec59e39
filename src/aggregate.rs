//! Concurrent fan-out across all backends.
//!
//! [`query_all_backends`] runs every retriever on its own blocking worker
//! (`tokio::task::spawn_blocking`) and joins them. Embedding and scoring
//! are CPU-bound, so the async dispatcher never runs them itself.
//!
//! A backend whose task panics, fails, or misses the optional fan-out
//! deadline contributes its empty result. A worker abandoned at the
//! deadline keeps running; any handle it was loading is published when it
//! finishes, or not at all if the load fails, and later queries reuse or
//! retry it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use eduimg_core::models::{BackendKind, BackendResult, StructureVariant};
use eduimg_core::Result;

use crate::backends::{retriever, Engine};

/// Response body of a fan-out query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResponse {
    pub query: String,
    pub results: BTreeMap<String, BackendResult>,
}

/// Response body of a single-backend query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendResponse {
    pub query: String,
    pub backend: String,
    pub results: BackendResult,
}

/// Query every backend concurrently, `k` results per list.
pub async fn query_all_backends(
    engine: Arc<Engine>,
    query: &str,
    k: usize,
) -> Result<AggregatedResponse> {
    let k = engine.validate_k(k)?;
    let deadline = engine
        .fanout_timeout()
        .map(|t| tokio::time::Instant::now() + t);

    let tasks: Vec<(BackendKind, JoinHandle<Result<BackendResult>>)> = BackendKind::ALL
        .iter()
        .map(|&kind| {
            let engine = Arc::clone(&engine);
            let query = query.to_string();
            let task = tokio::task::spawn_blocking(move || {
                retriever(kind).top_k(&engine, &query, k, None)
            });
            (kind, task)
        })
        .collect();

    let mut results = BTreeMap::new();
    for (kind, task) in tasks {
        let joined = match deadline {
            Some(at) => match tokio::time::timeout_at(at, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(backend = kind.name(), "backend missed the fan-out deadline");
                    results.insert(kind.name().to_string(), BackendResult::empty_for(kind));
                    continue;
                }
            },
            None => task.await,
        };

        let result = match joined {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_caller_error() => return Err(e),
            Ok(Err(e)) => {
                error!(backend = kind.name(), error = %e, "backend failed");
                BackendResult::empty_for(kind)
            }
            Err(e) => {
                error!(backend = kind.name(), error = %e, "backend task panicked");
                BackendResult::empty_for(kind)
            }
        };
        results.insert(kind.name().to_string(), result);
    }

    Ok(AggregatedResponse {
        query: query.to_string(),
        results,
    })
}

/// Query one backend on a worker thread, optionally pinned to a variant.
pub async fn query_backend(
    engine: Arc<Engine>,
    kind: BackendKind,
    query: &str,
    k: usize,
    variant: Option<StructureVariant>,
) -> Result<BackendResponse> {
    let k = engine.validate_k(k)?;
    let owned = query.to_string();
    let task = tokio::task::spawn_blocking(move || {
        retriever(kind).top_k(&engine, &owned, k, variant)
    });
    let results = match task.await {
        Ok(result) => result?,
        Err(e) => {
            error!(backend = kind.name(), error = %e, "backend task panicked");
            BackendResult::empty_for(kind)
        }
    };

    Ok(BackendResponse {
        query: query.to_string(),
        backend: kind.name().to_string(),
        results,
    })
}

/// Parse an optional variant query parameter.
pub fn parse_variant(raw: Option<i64>) -> Result<Option<StructureVariant>> {
    raw.map(StructureVariant::try_from).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::HandleLoader;
    use crate::config::RetrievalConfig;
    use eduimg_core::embedding::Embedder;
    use eduimg_core::lexical::{tokenize, Bm25Params, LexicalIndex};
    use eduimg_core::metadata::MetadataStore;
    use eduimg_core::models::{DocumentRecord, EmbeddingFamily, StopwordFlavor};
    use eduimg_core::vector::VectorIndex;
    use eduimg_core::RetrievalError;
    use std::time::Duration;

    /// Lexical backends answer; BGE panics; CLIP is slow.
    struct MixedLoader;

    impl HandleLoader for MixedLoader {
        fn load_vector(
            &self,
            family: EmbeddingFamily,
            _variant: Option<StructureVariant>,
        ) -> Result<VectorIndex> {
            match family {
                EmbeddingFamily::Bge => panic!("index reader crashed"),
                EmbeddingFamily::Clip => {
                    std::thread::sleep(Duration::from_millis(1500));
                    Err(RetrievalError::Embedding("slow".to_string()))
                }
            }
        }

        fn load_lexical(
            &self,
            _variant: StructureVariant,
            _flavor: StopwordFlavor,
        ) -> Result<LexicalIndex> {
            let corpus = vec![
                tokenize("balanced force"),
                tokenize("unbalanced motion"),
                tokenize("gravity"),
            ];
            let records = vec![DocumentRecord::default(); 3];
            LexicalIndex::from_tokens(
                &corpus,
                Some(MetadataStore::from_records(records)),
                Bm25Params::default(),
            )
        }

        fn embedder(&self, _family: EmbeddingFamily) -> Result<Arc<dyn Embedder>> {
            Err(RetrievalError::Embedding("unused".to_string()))
        }
    }

    fn engine(fanout_timeout_secs: u64) -> Arc<Engine> {
        Arc::new(Engine::with_loader(
            MixedLoader,
            &RetrievalConfig {
                fanout_timeout_secs,
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_failures_become_empty_results() {
        let response = query_all_backends(engine(1), "force", 1).await.unwrap();
        assert_eq!(response.query, "force");
        assert_eq!(response.results.len(), 4);

        assert_eq!(response.results["bge"], BackendResult::empty_for(BackendKind::Bge));
        assert_eq!(response.results["clip"], BackendResult::Single(Vec::new()));
        for name in ["bm25_with_stopwords", "bm25_without_stopwords"] {
            match &response.results[name] {
                BackendResult::PerVariant(map) => {
                    assert_eq!(map.len(), 5);
                    assert!(map.values().all(|docs| docs.len() == 1));
                }
                other => panic!("expected per-variant results, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_k_propagates() {
        assert!(matches!(
            query_all_backends(engine(0), "force", 0).await,
            Err(RetrievalError::InvalidQueryParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_single_backend_query() {
        let response = query_backend(
            engine(0),
            BackendKind::Bm25WithStopwords,
            "motion",
            2,
            parse_variant(Some(2)).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(response.backend, "bm25_with_stopwords");
        match response.results {
            BackendResult::Single(docs) => assert_eq!(docs[0].position, 1),
            other => panic!("expected a single list, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_variant() {
        assert_eq!(parse_variant(None).unwrap(), None);
        assert_eq!(parse_variant(Some(5)).unwrap().map(|v| v.get()), Some(5));
        assert!(matches!(
            parse_variant(Some(9)),
            Err(RetrievalError::InvalidQueryParameter(_))
        ));
        assert!(parse_variant(Some(0)).is_err());
    }
}

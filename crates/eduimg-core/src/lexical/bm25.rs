//! Okapi BM25 scoring over a tokenized corpus.
//!
//! IDF follows the classic Okapi form `ln(N - n + 0.5) - ln(n + 0.5)`.
//! Terms that appear in more than half the corpus get a negative IDF; those
//! are floored at `epsilon × mean(idf)` so common terms never subtract
//! from a document's score.

use std::collections::HashMap;

use crate::error::{Result, RetrievalError};

/// Ranking hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Document-length normalization, in `[0, 1]`.
    pub b: f64,
    /// Floor for negative IDFs, as a fraction of the mean IDF.
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bm25Model {
    params: Bm25Params,
    doc_freqs: Vec<HashMap<String, u32>>,
    doc_len: Vec<usize>,
    avgdl: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Model {
    /// Fit a model to a tokenized corpus.
    pub fn build(corpus: &[Vec<String>], params: Bm25Params) -> Self {
        let mut doc_freqs = Vec::with_capacity(corpus.len());
        let mut doc_len = Vec::with_capacity(corpus.len());
        let mut containing: HashMap<String, u32> = HashMap::new();
        let mut total_tokens = 0usize;

        for doc in corpus {
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in doc {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *containing.entry(term.clone()).or_insert(0) += 1;
            }
            total_tokens += doc.len();
            doc_len.push(doc.len());
            doc_freqs.push(freqs);
        }

        let n_docs = corpus.len() as f64;
        let mut idf: HashMap<String, f64> = HashMap::with_capacity(containing.len());
        let mut idf_sum = 0.0;
        let mut negative: Vec<String> = Vec::new();

        for (term, n) in containing {
            let n = f64::from(n);
            let w = (n_docs - n + 0.5).ln() - (n + 0.5).ln();
            idf_sum += w;
            if w < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term, w);
        }

        if !idf.is_empty() {
            let floor = params.epsilon * (idf_sum / idf.len() as f64);
            for term in negative {
                idf.insert(term, floor);
            }
        }

        let avgdl = if corpus.is_empty() {
            0.0
        } else {
            total_tokens as f64 / n_docs
        };

        Self {
            params,
            doc_freqs,
            doc_len,
            avgdl,
            idf,
        }
    }

    /// Reassemble a model that was fitted offline.
    ///
    /// `avgdl` is recomputed from `doc_len` when absent.
    pub fn from_parts(
        params: Bm25Params,
        doc_freqs: Vec<HashMap<String, u32>>,
        doc_len: Vec<usize>,
        idf: HashMap<String, f64>,
        avgdl: Option<f64>,
    ) -> Result<Self> {
        if doc_freqs.len() != doc_len.len() {
            return Err(RetrievalError::UnsupportedDocumentShape {
                position: doc_freqs.len().min(doc_len.len()),
                detail: format!(
                    "model has {} term-frequency maps but {} document lengths",
                    doc_freqs.len(),
                    doc_len.len()
                ),
            });
        }
        let avgdl = avgdl.unwrap_or_else(|| {
            if doc_len.is_empty() {
                0.0
            } else {
                doc_len.iter().sum::<usize>() as f64 / doc_len.len() as f64
            }
        });
        Ok(Self {
            params,
            doc_freqs,
            doc_len,
            avgdl,
            idf,
        })
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn corpus_size(&self) -> usize {
        self.doc_len.len()
    }

    pub fn avgdl(&self) -> f64 {
        self.avgdl
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    /// Score every document against a tokenized query.
    ///
    /// The returned vector is aligned with corpus position.
    pub fn score_all(&self, query: &[String]) -> Vec<f64> {
        let Bm25Params { k1, b, .. } = self.params;
        let mut scores = vec![0.0f64; self.corpus_size()];

        for term in query {
            let Some(idf) = self.idf.get(term).copied() else {
                continue;
            };
            for (pos, freqs) in self.doc_freqs.iter().enumerate() {
                let tf = match freqs.get(term) {
                    Some(&tf) if tf > 0 => f64::from(tf),
                    _ => continue,
                };
                let len_ratio = if self.avgdl > 0.0 {
                    self.doc_len[pos] as f64 / self.avgdl
                } else {
                    1.0
                };
                scores[pos] += idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * len_ratio));
            }
        }

        scores
    }
}

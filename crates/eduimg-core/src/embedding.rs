//! Embedder trait and vector helpers.
//!
//! Concrete embedders (fastembed-backed local models) live in the `eduimg`
//! app crate. Core code only needs the model name, the output
//! dimensionality, and a synchronous `embed` call that runs on whatever
//! worker thread the caller is on.

use crate::error::Result;

/// Turns query text into a fixed-length embedding.
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"bge-small-en-v1.5"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed one text. The result need not be normalized.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Scale `v` to unit L2 norm in place. Zero vectors are left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

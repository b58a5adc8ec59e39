//! Exact nearest-neighbour search over FAISS flat L2 index files.
//!
//! The offline embedding jobs persist one `IndexFlatL2` per (family,
//! variant) with `faiss.write_index`. [`FlatL2Index`] reads that layout
//! directly and searches it by brute force, so no FAISS build is needed at
//! query time.
//!
//! # File layout (little-endian)
//!
//! ```text
//! fourcc   "IxF2"  (or "IxFl" with metric_type = L2)
//! d        i32      vector dimensionality
//! ntotal   i64      number of stored vectors
//! dummy    i64 × 2
//! trained  u8
//! metric   i32      1 = L2 (a trailing f32 metric_arg follows when > 1)
//! count    u64      number of f32 values, must equal d × ntotal
//! data     f32 × count
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::embedding::{l2_normalize, Embedder};
use crate::error::{Result, RetrievalError};
use crate::metadata::MetadataStore;
use crate::models::RankedDocument;

const FOURCC_FLAT_L2: &[u8; 4] = b"IxF2";
const FOURCC_FLAT: &[u8; 4] = b"IxFl";
const FOURCC_FLAT_IP: &[u8; 4] = b"IxFI";
const METRIC_L2: i32 = 1;
const HEADER_DUMMY: i64 = 1 << 20;

/// A flat (uncompressed) L2 index held entirely in memory.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Build from row-major vectors. All rows must have length `dim`.
    pub fn from_vectors(dim: usize, vectors: &[Vec<f32>]) -> Result<Self> {
        if dim == 0 {
            return Err(RetrievalError::invalid("index dimensionality must be > 0"));
        }
        let mut data = Vec::with_capacity(dim * vectors.len());
        for v in vectors {
            if v.len() != dim {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dim,
                    actual: v.len(),
                });
            }
            data.extend_from_slice(v);
        }
        Ok(Self { dim, data })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes).map_err(|detail| RetrievalError::corrupt(path, detail))
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut r = Reader { bytes, pos: 0 };

        let fourcc = r.take(4)?;
        let flat_l2 = fourcc == FOURCC_FLAT_L2;
        if !flat_l2 && fourcc != FOURCC_FLAT {
            if fourcc == FOURCC_FLAT_IP {
                return Err("inner-product flat index; expected an L2 index".to_string());
            }
            return Err(format!(
                "unsupported index type {:?}; expected a flat L2 index",
                String::from_utf8_lossy(fourcc)
            ));
        }

        let d = r.i32()?;
        let ntotal = r.i64()?;
        let _dummy = r.i64()?;
        let _dummy = r.i64()?;
        let _trained = r.take(1)?;
        let metric = r.i32()?;
        if metric > 1 {
            let _metric_arg = r.take(4)?;
        }
        if metric != METRIC_L2 {
            return Err(format!("metric type {} is not L2", metric));
        }
        if d <= 0 || ntotal < 0 {
            return Err(format!("invalid header: d = {}, ntotal = {}", d, ntotal));
        }

        let dim = d as usize;
        let count = r.u64()? as usize;
        let expected = dim
            .checked_mul(ntotal as usize)
            .ok_or_else(|| "index size overflows".to_string())?;
        if count != expected {
            return Err(format!(
                "payload holds {} floats, header implies {} × {} = {}",
                count, ntotal, dim, expected
            ));
        }
        let payload = r.take(count * 4)?;
        let data = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self { dim, data })
    }

    /// Write in the same layout `faiss.write_index` uses for `IndexFlatL2`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut out = Vec::with_capacity(45 + self.data.len() * 4);
        out.extend_from_slice(FOURCC_FLAT_L2);
        out.extend_from_slice(&(self.dim as i32).to_le_bytes());
        out.extend_from_slice(&(self.len() as i64).to_le_bytes());
        out.extend_from_slice(&HEADER_DUMMY.to_le_bytes());
        out.extend_from_slice(&HEADER_DUMMY.to_le_bytes());
        out.push(1);
        out.extend_from_slice(&METRIC_L2.to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u64).to_le_bytes());
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        std::fs::write(path, out)?;
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dim).nth(position)
    }

    /// The `k` nearest rows as `(position, squared L2 distance)`.
    ///
    /// Ascending distance; equal distances keep ascending position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dim {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }

        let mut hits: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim)
            .map(|row| {
                row.iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>()
            })
            .enumerate()
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.truncate(k);
        Ok(hits)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| format!("truncated at byte {} (wanted {} more)", self.pos, n))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> std::result::Result<[u8; N], String> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn i32(&mut self) -> std::result::Result<i32, String> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> std::result::Result<i64, String> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> std::result::Result<u64, String> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}

/// A loaded vector backend: index, aligned metadata, and query embedder.
#[derive(Clone)]
pub struct VectorIndex {
    index: FlatL2Index,
    metadata: MetadataStore,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dim", &self.index.dim())
            .field("len", &self.index.len())
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

impl VectorIndex {
    /// Pair an index with its metadata, checking they line up.
    pub fn new(
        index: FlatL2Index,
        metadata: MetadataStore,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        metadata.check_aligned(index.len())?;
        if embedder.dims() != index.dim() {
            return Err(RetrievalError::DimensionMismatch {
                expected: index.dim(),
                actual: embedder.dims(),
            });
        }
        Ok(Self {
            index,
            metadata,
            embedder,
        })
    }

    /// Read a FAISS index file and its JSON metadata.
    pub fn load(
        index_path: &Path,
        metadata_path: &Path,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let started = Instant::now();
        let index = FlatL2Index::read(index_path)?;
        let metadata = MetadataStore::from_json_file(metadata_path)?;
        let loaded = Self::new(index, metadata, embedder)?;
        info!(
            index = %index_path.display(),
            vectors = loaded.len(),
            dim = loaded.index.dim(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded vector index"
        );
        Ok(loaded)
    }

    pub fn index(&self) -> &FlatL2Index {
        &self.index
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// L2-normalized query embedding.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = self.embedder.embed(text)?;
        l2_normalize(&mut v);
        Ok(v)
    }

    /// The `k` documents closest to the query text.
    pub fn top_k(&self, query: &str, k: usize) -> Result<Vec<RankedDocument>> {
        let embedding = self.embed(query)?;
        let hits = self.index.search(&embedding, k)?;

        Ok(hits
            .into_iter()
            .filter_map(|(position, distance)| match self.metadata.get(position) {
                Ok(record) => Some((position, distance, record.clone())),
                Err(e) => {
                    debug!(error = %e, "dropping vector hit without metadata");
                    None
                }
            })
            .enumerate()
            .map(|(rank, (position, score, record))| RankedDocument {
                rank,
                position,
                score,
                record,
            })
            .collect())
    }
}

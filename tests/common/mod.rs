//! Shared fixtures: a temp artifact tree laid out the way the offline jobs
//! write it, plus a deterministic hashing embedder.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use eduimg::backends::{ArtifactLoader, Engine};
use eduimg::config::Config;
use eduimg::core::embedding::{l2_normalize, Embedder};
use eduimg::core::models::EmbeddingFamily;
use eduimg::core::vector::FlatL2Index;
use eduimg::core::Result;

/// Feature-hashing embedder: each lower-cased token bumps one dimension.
pub struct HashEmbedder {
    name: String,
    dims: usize,
}

impl HashEmbedder {
    pub fn new(name: &str, dims: usize) -> Self {
        Self {
            name: name.to_string(),
            dims,
        }
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf29ce484222325u64, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x100000001b3)
    })
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dims];
        for token in text.split_whitespace() {
            let slot = (fnv1a(&token.to_lowercase()) % self.dims as u64) as usize;
            v[slot] += 1.0;
        }
        Ok(v)
    }
}

const STOPWORDS: [&str; 11] = [
    "a", "the", "to", "of", "on", "at", "in", "its", "and", "from", "into",
];

pub const BGE_DIMS: usize = 384;
pub const CLIP_DIMS: usize = 512;

/// (topic, subtopic, description)
pub const DOCS: [(&str, &str, &str); 6] = [
    ("Force", "Push and pull", "a child applies force to push a heavy box"),
    ("Force", "Friction", "friction force slows a sliding block on a ramp"),
    ("Plants", "Photosynthesis", "green leaves capture sunlight to make food"),
    ("Earth", "Water cycle", "water evaporates from the sea and condenses into clouds"),
    ("Light", "Refraction", "a straw looks bent in a glass of water"),
    ("Magnetism", "Poles", "a bar magnet attracts iron filings at its poles"),
];

/// Text a given structure variant was built from.
pub fn variant_text(variant: u8, doc: &(&str, &str, &str)) -> String {
    let (topic, subtopic, description) = doc;
    match variant {
        1 => description.to_string(),
        2 => format!("{} {}", topic, description),
        3 => format!("{} {}", topic, subtopic),
        4 => format!("{} {} {}", topic, subtopic, description),
        _ => format!("{} {} {} {}", topic, subtopic, topic, description),
    }
}

pub fn metadata(variant: u8) -> serde_json::Value {
    json!(DOCS
        .iter()
        .enumerate()
        .map(|(i, d)| json!({
            "topic": d.0,
            "subtopic": d.1,
            "image_url": format!("https://images.example/{}.png", i),
            "context_free_description": d.2,
            "structure": variant,
        }))
        .collect::<Vec<_>>())
}

pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
}

impl Fixture {
    /// Full artifact tree for all four backends.
    ///
    /// - BGE: one index + metadata per variant.
    /// - CLIP: one unified index + metadata.
    /// - BM25 with stopwords: JSON corpus records per variant.
    /// - BM25 without stopwords: only the pickled flavor default.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default().with_artifact_root(dir.path());
        config.embedding.provider = "disabled".to_string();
        let fixture = Self { dir, config };

        let bge = HashEmbedder::new("hash-bge", BGE_DIMS);
        for v in 1..=5u8 {
            let (index, meta) = fixture.bge_paths(v);
            write_vector_artifacts(&bge, &index, &meta, v);
        }

        let clip = HashEmbedder::new("hash-clip", CLIP_DIMS);
        write_vector_artifacts(
            &clip,
            &fixture.config.artifacts.clip_dir.join("clip_index.faiss"),
            &fixture.config.artifacts.clip_dir.join("clip_metadata.json"),
            1,
        );

        let with_dir = fixture.lexical_dir("with_stopwords");
        for v in 1..=5u8 {
            let corpus: Vec<String> = DOCS.iter().map(|d| variant_text(v, d)).collect();
            write_json(
                &with_dir.join(format!("with_stopwords_structure_{}.json", v)),
                &json!({"corpus": corpus, "metadata": metadata(v)}),
            );
        }

        let without_dir = fixture.lexical_dir("without_stopwords");
        let docs: Vec<serde_json::Value> = DOCS
            .iter()
            .zip(metadata(1).as_array().unwrap())
            .map(|(d, m)| {
                let tokens: Vec<String> = variant_text(1, d)
                    .split_whitespace()
                    .filter(|t| !STOPWORDS.contains(t))
                    .map(str::to_lowercase)
                    .collect();
                json!({"page_content": tokens, "metadata": m})
            })
            .collect();
        let bytes = serde_pickle::to_vec(&docs, serde_pickle::SerOptions::new()).unwrap();
        std::fs::write(without_dir.join("without_stopwords.pkl"), bytes).unwrap();

        fixture
    }

    pub fn bge_paths(&self, variant: u8) -> (PathBuf, PathBuf) {
        let dir = &self.config.artifacts.bge_dir;
        (
            dir.join(format!("text_index_structure_{}.faiss", variant)),
            dir.join(format!("text_metadata_structure_{}.json", variant)),
        )
    }

    pub fn lexical_dir(&self, flavor: &str) -> PathBuf {
        let dir = self.config.artifacts.lexical_dir.join(flavor);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Engine whose vector backends embed with [`HashEmbedder`].
    pub fn engine(&self) -> Arc<Engine> {
        let loader = ArtifactLoader::new(&self.config)
            .with_embedder(
                EmbeddingFamily::Bge,
                Arc::new(HashEmbedder::new("hash-bge", BGE_DIMS)),
            )
            .with_embedder(
                EmbeddingFamily::Clip,
                Arc::new(HashEmbedder::new("hash-clip", CLIP_DIMS)),
            );
        Arc::new(Engine::with_loader(loader, &self.config.retrieval))
    }

    /// Write the config as TOML so the binary can read it.
    pub fn write_config(&self) -> PathBuf {
        let a = &self.config.artifacts;
        let content = format!(
            r#"[artifacts]
bge_dir = "{}"
clip_dir = "{}"
lexical_dir = "{}"

[embedding]
provider = "disabled"
"#,
            a.bge_dir.display(),
            a.clip_dir.display(),
            a.lexical_dir.display()
        );
        let path = self.dir.path().join("eduimg.toml");
        std::fs::write(&path, content).unwrap();
        path
    }
}

fn write_vector_artifacts(embedder: &HashEmbedder, index: &Path, meta: &Path, variant: u8) {
    std::fs::create_dir_all(index.parent().unwrap()).unwrap();
    let rows: Vec<Vec<f32>> = DOCS
        .iter()
        .map(|d| {
            let mut v = embedder.embed(&variant_text(variant, d)).unwrap();
            l2_normalize(&mut v);
            v
        })
        .collect();
    FlatL2Index::from_vectors(embedder.dims(), &rows)
        .unwrap()
        .write_to(index)
        .unwrap();
    write_json(meta, &metadata(variant));
}

fn write_json(path: &Path, value: &serde_json::Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec(value).unwrap()).unwrap();
}

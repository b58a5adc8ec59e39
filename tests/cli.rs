mod common;

use std::path::{Path, PathBuf};
use std::process::Command;

use common::Fixture;

fn eduimg_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("eduimg");
    path
}

fn run_eduimg(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = eduimg_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run eduimg binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_check_reports_each_handle() {
    let fixture = Fixture::new();
    let config_path = fixture.write_config();

    let (stdout, stderr, success) = run_eduimg(&config_path, &["check"]);
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);

    let line = |key: &str| {
        stdout
            .lines()
            .find(|l| l.starts_with(key))
            .unwrap_or_else(|| panic!("no line for {} in:\n{}", key, stdout))
            .to_string()
    };
    assert!(line("bm25_with_stopwords/structure_3").contains("OK"));
    assert!(line("bm25_without_stopwords/structure_5").contains("6 documents"));
    // The embedding provider is disabled in the written config.
    assert!(line("bge/structure_1").contains("FAILED"));
    assert!(stdout.contains("10 / 16 handles loaded"));
}

#[test]
fn test_check_fails_without_artifacts() {
    let fixture = Fixture::new();
    let config_path = fixture.write_config();
    for root in [
        &fixture.config.artifacts.bge_dir,
        &fixture.config.artifacts.clip_dir,
        &fixture.config.artifacts.lexical_dir,
    ] {
        std::fs::remove_dir_all(root).unwrap();
    }

    let (stdout, _, success) = run_eduimg(&config_path, &["check"]);
    assert!(!success, "check should fail with no artifacts: {}", stdout);
    assert!(stdout.contains("0 / 16 handles loaded"));
}

#[test]
fn test_artifacts_lists_files() {
    let fixture = Fixture::new();
    let config_path = fixture.write_config();

    let (stdout, stderr, success) = run_eduimg(&config_path, &["artifacts"]);
    assert!(success, "artifacts failed: stderr={}", stderr);
    assert!(stdout.contains("text_index_structure_1.faiss"));
    assert!(stdout.contains("clip_metadata.json"));
    assert!(stdout.contains("without_stopwords.pkl"));
    assert!(!stdout.contains("(missing)"));
}

#[test]
fn test_query_single_backend_prints_json() {
    let fixture = Fixture::new();
    let config_path = fixture.write_config();

    let (stdout, stderr, success) = run_eduimg(
        &config_path,
        &[
            "query",
            "force",
            "--backend",
            "bm25_with_stopwords",
            "--variant",
            "3",
            "--k",
            "2",
        ],
    );
    assert!(success, "query failed: stderr={}", stderr);

    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["backend"], "bm25_with_stopwords");
    let list = body["results"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|d| d["topic"] == "Force"));
}

#[test]
fn test_query_fanout_contains_disabled_embedder() {
    let fixture = Fixture::new();
    let config_path = fixture.write_config();

    let (stdout, stderr, success) = run_eduimg(&config_path, &["query", "magnet"]);
    assert!(success, "query failed: stderr={}", stderr);

    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(body["results"]["clip"].as_array().unwrap().is_empty());
    assert_eq!(
        body["results"]["bm25_without_stopwords"]["1"][0]["topic"],
        "Magnetism"
    );
}

#[test]
fn test_query_rejects_unknown_backend() {
    let fixture = Fixture::new();
    let config_path = fixture.write_config();

    let (_, stderr, success) = run_eduimg(&config_path, &["query", "force", "--backend", "tfidf"]);
    assert!(!success);
    assert!(stderr.contains("tfidf"), "stderr: {}", stderr);
}

#[test]
fn test_variant_requires_backend() {
    let fixture = Fixture::new();
    let config_path = fixture.write_config();

    let (_, _, success) = run_eduimg(&config_path, &["query", "force", "--variant", "2"]);
    assert!(!success);
}

//! Artifact inventory.
//!
//! Lists every artifact file under the configured directories with its
//! size, modification time, and SHA-256 fingerprint. Used by
//! `eduimg artifacts` to confirm which offline build a deployment is
//! serving.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;

/// File extensions the offline jobs produce.
const ARTIFACT_EXTENSIONS: [&str; 4] = ["faiss", "json", "pkl", "pickle"];

/// One artifact file on disk.
#[derive(Debug, Clone)]
pub struct ArtifactFile {
    /// Which configured root the file was found under.
    pub root: &'static str,
    pub path: PathBuf,
    pub size: u64,
    /// Modification time as a Unix timestamp, if the platform reports one.
    pub modified: Option<i64>,
    pub sha256: String,
}

/// Walk the configured artifact roots. Missing roots are skipped.
pub fn scan_artifacts(config: &Config) -> Result<Vec<ArtifactFile>> {
    let mut files = Vec::new();
    for (label, root) in config.artifacts.roots() {
        if !root.exists() {
            continue;
        }
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() || !is_artifact(entry.path()) {
                continue;
            }
            let meta = entry.metadata()?;
            let modified = meta
                .modified()
                .ok()
                .map(chrono::DateTime::<chrono::Utc>::from)
                .map(|dt| dt.timestamp());
            files.push(ArtifactFile {
                root: label,
                path: entry.path().to_path_buf(),
                size: meta.len(),
                modified,
                sha256: sha256_file(entry.path())?,
            });
        }
    }
    Ok(files)
}

fn is_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ARTIFACT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Run the artifacts command: scan and print the inventory.
pub fn run_artifacts(config: &Config) -> Result<()> {
    let files = scan_artifacts(config)?;

    println!("eduimg — Artifact Inventory");
    println!("===========================");
    println!();
    for (label, root) in config.artifacts.roots() {
        let status = if root.exists() { "" } else { "  (missing)" };
        println!("  {:<6} {}{}", label, root.display(), status);
    }
    println!();

    if files.is_empty() {
        println!("  No artifact files found.");
        println!();
        return Ok(());
    }

    println!(
        "  {:<6} {:<52} {:>10}  {:<14}  {}",
        "ROOT", "FILE", "SIZE", "MODIFIED", "SHA256"
    );
    println!("  {}", "-".repeat(100));

    let mut total = 0u64;
    for f in &files {
        total += f.size;
        let modified = match f.modified {
            Some(ts) => format_ts_relative(ts),
            None => "unknown".to_string(),
        };
        println!(
            "  {:<6} {:<52} {:>10}  {:<14}  {}",
            f.root,
            display_relative(config, f),
            format_bytes(f.size),
            modified,
            &f.sha256[..12]
        );
    }

    println!();
    println!("  {} files, {}", files.len(), format_bytes(total));
    println!();
    Ok(())
}

fn display_relative(config: &Config, file: &ArtifactFile) -> String {
    config
        .artifacts
        .roots()
        .iter()
        .find(|(label, _)| *label == file.root)
        .and_then(|(_, root)| file.path.strip_prefix(root).ok())
        .unwrap_or(&file.path)
        .display()
        .to_string()
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

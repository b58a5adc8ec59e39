//! `eduimg check`: load every backend handle and report which ones work.
//!
//! Useful after the offline jobs rewrite the artifact directories.

use anyhow::{bail, Result};

use crate::backends::Engine;
use crate::config::Config;

/// Load every backend handle and print whether it is usable.
///
/// Fails only when no handle at all can be loaded.
pub fn run_check(config: &Config) -> Result<()> {
    let engine = Engine::new(config);
    let results = engine.warm();

    println!("{:<36} {:<8} DETAIL", "HANDLE", "STATUS");
    let mut loaded = 0;
    for (key, result) in &results {
        match result {
            Ok(documents) => {
                loaded += 1;
                println!("{:<36} {:<8} {} documents", key.to_string(), "OK", documents);
            }
            Err(e) => println!("{:<36} {:<8} {}", key.to_string(), "FAILED", e),
        }
    }

    println!();
    println!("{} / {} handles loaded", loaded, results.len());
    if loaded == 0 {
        bail!("no backend handle could be loaded; check [artifacts] in the config");
    }
    Ok(())
}

//! # eduimg CLI
//!
//! ## Usage
//!
//! ```bash
//! eduimg --config ./config/eduimg.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `eduimg serve [--warm]` | Start the HTTP query API |
//! | `eduimg query "<text>"` | Run a query and print the JSON response |
//! | `eduimg check` | Load every backend handle and report status |
//! | `eduimg artifacts` | List artifact files with sizes and fingerprints |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use eduimg::aggregate::{parse_variant, query_all_backends, query_backend};
use eduimg::backends::Engine;
use eduimg::core::models::BackendKind;
use eduimg::{check, config, inventory, server};

/// eduimg: query several retrieval backends for educational images.
#[derive(Parser)]
#[command(
    name = "eduimg",
    about = "eduimg — multi-backend retrieval for educational images",
    version,
    long_about = "eduimg serves dense (BGE, CLIP) and lexical (BM25) retrieval over \
    pre-built image indexes, fanning each query out to every backend concurrently."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/eduimg.toml`. A missing file falls back to
    /// built-in defaults.
    #[arg(long, global = true, default_value = "./config/eduimg.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve {
        /// Load every backend handle before accepting requests.
        #[arg(long)]
        warm: bool,
    },

    /// Run one query and print the JSON response.
    Query {
        /// The query text.
        query: String,

        /// Results per list. Defaults to `[retrieval].default_k`.
        #[arg(long)]
        k: Option<usize>,

        /// Query a single backend (`bge`, `clip`, `bm25_with_stopwords`,
        /// `bm25_without_stopwords`) instead of all of them.
        #[arg(long)]
        backend: Option<String>,

        /// Pin a structure variant (1-5). Requires `--backend`.
        #[arg(long, requires = "backend")]
        variant: Option<i64>,
    },

    /// Load every backend handle and print a status table.
    ///
    /// Exits non-zero if no handle can be loaded.
    Check,

    /// List artifact files under the configured directories.
    Artifacts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve { warm } => {
            server::run_server(&cfg, warm).await?;
        }
        Commands::Query {
            query,
            k,
            backend,
            variant,
        } => {
            let engine = Arc::new(Engine::new(&cfg));
            let k = k.unwrap_or(engine.default_k());
            let json = match backend {
                Some(name) => {
                    let kind: BackendKind = name.parse()?;
                    let variant = parse_variant(variant)?;
                    serde_json::to_string_pretty(
                        &query_backend(engine, kind, &query, k, variant).await?,
                    )?
                }
                None => serde_json::to_string_pretty(&query_all_backends(engine, &query, k).await?)?,
            };
            println!("{}", json);
        }
        Commands::Check => {
            tokio::task::spawn_blocking(move || check::run_check(&cfg)).await??;
        }
        Commands::Artifacts => {
            inventory::run_artifacts(&cfg)?;
        }
    }

    Ok(())
}

//! # Pagewise CLI (`pagewise`)
//!
//! Drives the two pipeline operations from the shell.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pagewise index` | Index new and changed files in the data folder |
//! | `pagewise ask "<question>"` | Answer a question from the indexed documents |
//! | `pagewise search "<query>"` | Show the nearest chunks for a query |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pagewise::config::{self, Config};
use pagewise::Pagewise;

/// Pagewise: ask questions about a folder of PDF and Markdown documents.
#[derive(Parser)]
#[command(name = "pagewise", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pagewise.toml`. When the file does not exist,
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/pagewise.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index new and modified documents, dropping deleted ones.
    Index,

    /// Answer a question using the indexed documents.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// List the chunks nearest to a query.
    Search {
        /// The search query string.
        query: String,

        /// Number of chunks to return (defaults to `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &std::path::Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = load(&cli.config)?;
    let default_k = cfg.retrieval.k;
    let mut pipeline = Pagewise::open(cfg).await?;

    match cli.command {
        Commands::Index => {
            let report = pipeline.index_documents().await?;
            println!("index");
            println!("  new files: {}", report.new_files);
            println!("  modified files: {}", report.modified_files);
            println!("  unchanged files: {}", report.unchanged_files);
            println!("  removed files: {}", report.stale_files);
            println!("  failed files: {}", report.failed_files);
            println!("  chunks written: {}", report.chunks_written);
            println!("  chunks reused: {}", report.chunks_reused);
            println!("  chunks removed: {}", report.chunks_removed);
            println!("  total chunks: {}", report.total_chunks);
            println!("ok");
        }
        Commands::Ask { question } => {
            let answer = pipeline.answer(&question).await?;
            println!("{}", answer);
        }
        Commands::Search { query, k } => {
            let result = pipeline.search(&query, k.unwrap_or(default_k)).await?;
            if result.is_empty() {
                println!("No results.");
            }
            for (i, item) in result.items.iter().enumerate() {
                let meta = &item.chunk.metadata;
                println!(
                    "{}. [{:.4}] {} p.{} ({})",
                    i + 1,
                    item.distance,
                    meta.source,
                    meta.page,
                    meta.kind
                );
                let preview: String = item.chunk.text.chars().take(240).collect();
                println!("    {}", preview.replace('\n', " "));
            }
        }
    }

    Ok(())
}

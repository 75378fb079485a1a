//! # ragline CLI
//!
//! ## Usage
//!
//! ```bash
//! ragline --config ./config/ragline.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragline init` | Create the SQLite chunk table (no-op for Supabase) |
//! | `ragline ingest <path>` | Load, split, embed, and store one document |
//! | `ragline search "<query>"` | Print the closest chunks |
//! | `ragline ask "<query>"` | Answer a question from retrieved context |
//! | `ragline serve` | Start the HTTP server |
//! | `ragline completions <shell>` | Print shell completions |

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use ragline::config::{self, Config};
use ragline::service::{ChatRequest, Service};
use ragline::sqlite_store::SqliteStore;

/// ragline: chunk, embed, retrieve, and answer with citations.
#[derive(Parser)]
#[command(name = "ragline", version)]
struct Cli {
    /// Path to configuration file (TOML). Missing files fall back to
    /// defaults plus environment variables.
    #[arg(long, global = true, default_value = "./config/ragline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite chunk table. Safe to run repeatedly.
    Init,

    /// Ingest one document (.pdf, .txt, .md).
    Ingest {
        path: PathBuf,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Similarity search over stored chunks.
    Search {
        query: String,

        /// Number of results (clamped to retrieval.max_k).
        #[arg(long)]
        k: Option<usize>,

        /// Minimum similarity in [0, 1].
        #[arg(long)]
        threshold: Option<f64>,

        /// Metadata filter as a JSON object, e.g. '{"source":"a.pdf"}'.
        #[arg(long)]
        filter: Option<String>,
    },

    /// Retrieve context and ask the language model.
    Ask {
        query: String,

        #[arg(long)]
        k: Option<usize>,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        max_output_tokens: Option<u32>,

        #[arg(long)]
        temperature: Option<f32>,
    },

    /// Start the HTTP server on [server].bind.
    Serve,

    /// Print shell completions.
    Completions { shell: Shell },
}

fn parse_filter(raw: Option<String>) -> anyhow::Result<Option<Map<String, Value>>> {
    raw.map(|s| {
        serde_json::from_str::<Map<String, Value>>(&s)
            .with_context(|| format!("--filter must be a JSON object, got: {s}"))
    })
    .transpose()
}

async fn run_init(cfg: &Config) -> anyhow::Result<()> {
    if cfg.store.backend == "sqlite" {
        let store = SqliteStore::open(&cfg.store.sqlite_path, &cfg.store.table).await?;
        println!(
            "SQLite store ready at {} (table '{}', {} chunks).",
            cfg.store.sqlite_path.display(),
            cfg.store.table,
            store.count().await?
        );
    } else {
        println!(
            "Supabase backend: create table '{}' and function '{}' in your project.",
            cfg.store.table, cfg.store.match_function
        );
    }
    Ok(())
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

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "ragline", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        return run_init(&cfg).await;
    }

    let service = Service::from_config(cfg).await?;

    match cli.command {
        Commands::Ingest {
            path,
            chunk_size,
            chunk_overlap,
        } => {
            let out = service.ingest(&path, chunk_size, chunk_overlap).await?;
            println!(
                "Ingested {}: {} chunks added to '{}'.",
                path.display(),
                out.chunks_added,
                out.table_name
            );
        }
        Commands::Search {
            query,
            k,
            threshold,
            filter,
        } => {
            let req = ChatRequest {
                k,
                match_threshold: threshold,
                filter: parse_filter(filter)?,
                ..ChatRequest::new(query)
            };
            let matches = service.search(&req).await?;
            if matches.is_empty() {
                println!("No results.");
            }
            for (i, m) in matches.iter().enumerate() {
                let preview: String = m.chunk.text.chars().take(200).collect();
                println!(
                    "{}. [{:.3}] {} (page {})",
                    i + 1,
                    m.similarity,
                    m.chunk.metadata.source.as_deref().unwrap_or("-"),
                    m.chunk
                        .metadata
                        .page
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                println!("   {}", preview.replace('\n', " "));
            }
        }
        Commands::Ask {
            query,
            k,
            model,
            max_output_tokens,
            temperature,
        } => {
            let req = ChatRequest {
                k,
                model,
                max_output_tokens,
                temperature,
                ..ChatRequest::new(query)
            };
            let out = service.chat(&req).await?;
            println!("{}", out.answer);
            if !out.sources.is_empty() {
                println!();
                println!("Sources:");
                for s in &out.sources {
                    println!("  - {}", s.metadata);
                }
            }
        }
        Commands::Serve => {
            ragline::server::run_server(service).await?;
        }
        Commands::Init | Commands::Completions { .. } => {}
    }

    Ok(())
}

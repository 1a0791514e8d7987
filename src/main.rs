//! # Remote Curator CLI (`curator`)
//!
//! ## Usage
//!
//! ```bash
//! curator --config ./config/curator.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `curator run` | Execute one full pipeline run and print the summary |
//! | `curator query "<text>"` | Similarity query against the published index |
//! | `curator status` | Print the current in-process run status |
//! | `curator serve` | Start the HTTP server |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use remote_curator::config::{self, Config};
use remote_curator::embedding;
use remote_curator::remote::http::HttpRemoteStore;
use remote_curator::server;
use remote_curator::service::{Curator, StartOutcome};

/// Remote Curator — background curation for remote file stores.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/curator.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "curator",
    about = "Remote Curator — classify, deduplicate, and semantically index a remote file store",
    version,
    long_about = "Remote Curator sweeps a remote hierarchical file store exactly once per run, \
    classifies files into managed buckets, extracts and deduplicates text content, and maintains \
    an atomically published similarity index queryable from the CLI or an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/curator.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one full pipeline run.
    ///
    /// Scans the remote namespace, classifies and relocates every file,
    /// admits new text into the knowledge store, and rebuilds the
    /// similarity index when anything new was admitted. Prints the run
    /// summary as JSON when done.
    Run,

    /// Similarity query against the published index.
    Query {
        /// The query text.
        text: String,

        /// Maximum number of hits to return.
        #[arg(long, default_value_t = 3)]
        top_k: usize,
    },

    /// Print the current run status as JSON.
    ///
    /// Run state lives in the owning process only; outside of `serve` (or
    /// a concurrent `run` in the same process) this reports Idle.
    Status,

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// run-trigger, status, and query endpoints.
    Serve,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,remote_curator=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_curator(config: Config) -> Result<Curator> {
    let store = Arc::new(HttpRemoteStore::new(
        &config.remote.base_url,
        config.limits.download_retries,
    )?);
    let embedder = embedding::create_embedder(&config.embedding)?;
    Curator::new(config, store, Arc::from(embedder))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run => {
            let curator = build_curator(config)?;
            match curator.run_to_completion().await {
                StartOutcome::AlreadyRunning => {
                    anyhow::bail!("a pipeline run is already in flight");
                }
                StartOutcome::Started => {
                    let status = curator.status();
                    println!("{}", serde_json::to_string_pretty(&status)?);
                }
            }
        }
        Commands::Query { text, top_k } => {
            let curator = build_curator(config)?;
            let hits = curator.query(&text, top_k).await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Commands::Status => {
            let curator = build_curator(config)?;
            println!("{}", serde_json::to_string_pretty(&curator.status())?);
        }
        Commands::Serve => {
            let bind = config.server.bind.clone();
            let curator = build_curator(config)?;
            server::run_server(curator, &bind).await?;
        }
    }

    Ok(())
}

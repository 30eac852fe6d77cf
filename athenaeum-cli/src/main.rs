//! Athenaeum CLI: terminal interface for the Athenaeum research assistant.
//!
//! Indexes a JSONL corpus in memory, then searches it, answers a question
//! through the agent, or cross-examines a draft against it.

mod commands;
mod corpus;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Athenaeum: hybrid retrieval and a research agent over your library
#[derive(Parser, Debug)]
#[command(name = "athenaeum", version, about, long_about = None)]
struct Cli {
    /// JSONL corpus file, one passage per line
    #[arg(long)]
    corpus: PathBuf,

    /// Workspace directory (for `.athenaeum/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// JSON file with reference-library records
    #[arg(long)]
    references: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Hybrid search with reranking
    Search {
        query: String,
        /// Passages to keep after reranking
        #[arg(long)]
        top_k: Option<usize>,
        /// Show each retriever's list, the fused list and the rerank moves
        #[arg(long)]
        explain: bool,
    },
    /// Ask the research agent one question
    Ask {
        message: String,
        /// Conversation thread to continue
        #[arg(long, default_value = "default")]
        thread: String,
    },
    /// Compare a draft against the library
    CrossExamine {
        /// Path to the draft file
        draft: String,
        /// Concept to focus the comparison on
        #[arg(long)]
        focus: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "athenaeum", "athenaeum")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "athenaeum.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    let config = athenaeum_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config.ensure_valid()?;

    let context = commands::Context {
        config,
        corpus: cli.corpus,
        references: cli.references,
    };
    commands::handle_command(cli.command, context).await
}

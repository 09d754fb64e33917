//! nbhist server binary.
//!
//! Records notebook edit history on behalf of a frontend.
//!
//! Usage:
//!   # Read JSON-lines save requests on stdin, reply on stdout
//!   nbhist-server serve
//!
//!   # Activity overview for one notebook
//!   nbhist-server summary ~/project/analysis.ipynb --start 1700000000000
//!
//! Logs go to stderr; `RUST_LOG` adjusts the level.

mod protocol;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use nbhist_kernel::{HistoryConfig, HistoryTracker};

/// Notebook edit-history recorder.
#[derive(Parser, Debug)]
#[command(name = "nbhist-server")]
#[command(about = "Record and summarize notebook edit history")]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/nbhist/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding config and NBHIST_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer save requests on stdin until EOF
    Serve,

    /// Print an activity summary for a notebook
    Summary {
        /// Notebook path as the frontend reports it
        notebook: PathBuf,

        /// Range start, Unix milliseconds
        #[arg(long, default_value_t = 0)]
        start: i64,

        /// Range end, Unix milliseconds
        #[arg(long, default_value_t = i64::MAX)]
        end: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries replies; logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = HistoryConfig::resolve(args.config.as_deref()).context("loading config")?;
    if let Some(dir) = args.data_dir {
        config = config.with_data_directory(dir);
    }

    let tracker = HistoryTracker::new(config);

    match args.command {
        Command::Serve => run_serve(&tracker).await,
        Command::Summary {
            notebook,
            start,
            end,
        } => run_summary(&tracker, &notebook, start, end).await,
    }
}

async fn run_serve(tracker: &HistoryTracker) -> Result<()> {
    tracing::info!(
        data_dir = %tracker.config().data_directory.display(),
        "nbhist-server ready"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let handled = protocol::serve(tracker, stdin, tokio::io::stdout()).await;

    let failures = tracker.shutdown().await;
    let handled = handled.context("reading requests")?;
    tracing::info!(requests = handled, "stdin closed, shutting down");

    if !failures.is_empty() {
        anyhow::bail!("{} notebook(s) have unflushed actions", failures.len());
    }
    Ok(())
}

async fn run_summary(
    tracker: &HistoryTracker,
    notebook: &std::path::Path,
    start: i64,
    end: i64,
) -> Result<()> {
    let summary = tracker
        .summary(notebook, start, end)
        .await
        .with_context(|| format!("summarizing {}", notebook.display()))?;

    let location = tracker.locate(notebook);
    let secs = summary.active_ms / 1000;
    println!("notebook:  {}", location.hashed_notebook_path());
    println!("actions:   {}", summary.actions);
    println!("runs:      {}", summary.runs);
    println!("deletions: {}", summary.deletions);
    println!("active:    {}m {:02}s", secs / 60, secs % 60);
    Ok(())
}

//! Command-line interface. Every flag can also come from the environment.

use std::path::PathBuf;

use clap::Parser;

/// Fetch news, keep keyword matches not sent before, and push one digest.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Config file (TOML or JSON). Falls back to $NEWS_DIGEST_CONFIG, then config/news_digest.{toml,json}
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the sent-articles store path from the config
    #[arg(short, long, env = "NEWS_DIGEST_STORE")]
    pub store: Option<PathBuf>,

    /// Print the digest to stdout instead of sending it; never touches the store
    #[arg(long)]
    pub dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "NEWS_DIGEST_LOG_JSON")]
    pub log_json: bool,

    /// Write Prometheus metrics for this run to the given file at exit
    #[arg(long, env = "NEWS_DIGEST_METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,
}

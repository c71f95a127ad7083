use std::path::PathBuf;

use clap::Parser;
use harvester_engine::MergePolicy;

/// Fetch a list of URLs concurrently and collect their JSON bodies into one
/// line-delimited output file.
#[derive(Debug, Parser)]
#[command(name = "harvest", version, about)]
pub struct Cli {
    /// Line-delimited list of URLs [default: urls.txt]
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output JSON lines file [default: results.jsonl]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// RON configuration file; command-line flags take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of pending URLs before reading the input pauses [default: 100]
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Number of concurrent workers [default: 5]
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Per-request timeout in seconds [default: 60]
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Maximum simultaneous HTTP requests [default: 5]
    #[arg(long)]
    pub connection_limit: Option<usize>,

    /// Extra attempts for transient network failures [default: 0]
    #[arg(long)]
    pub retries: Option<u32>,

    /// Directory for in-flight response bodies [default: private temp dir]
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// When staged bodies are merged: deferred or immediate [default: deferred]
    #[arg(long)]
    pub merge_policy: Option<MergePolicy>,

    /// Keep unparseable bodies as records without content
    #[arg(long)]
    pub keep_unparsed: bool,

    /// Seconds workers get to exit after cancellation [default: 30]
    #[arg(long)]
    pub shutdown_grace: Option<u64>,

    /// Log destination: terminal, file or both
    #[arg(long, default_value = "terminal")]
    pub log: String,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

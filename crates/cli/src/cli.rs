use std::path::PathBuf;

use clap::Parser;

/// Run a TOML job file through a pool of pumice worker processes.
///
/// Prints one JSON line per finished task, in completion order.
#[derive(Parser, Debug)]
#[command(name = "pumice", version, about = "Run jobs in parallel worker processes")]
pub struct CliArgs {
    /// Job file listing the tasks to run
    pub jobs: PathBuf,

    /// Maximum number of concurrent workers (default: logical core count)
    #[arg(short = 'j', long, env = "PUMICE_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Pool config file (TOML); PUMICE_* environment variables apply on top
    #[arg(long, env = "PUMICE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Worker binary to start for each task
    #[arg(long)]
    pub worker: Option<PathBuf>,
}

//! pumice-worker: executes one encoded task and reports its outcome.
//!
//! Started by the pool with the encoded task as its last argument. The framed
//! outcome goes to stdout; logs go to stderr so they never corrupt the frame.

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use pumice::{harness, ops, Outcome};

// ── CLI ─────────────────────────────────────────────────────────────

/// Pumice worker: runs a single task from the built-in operation registry.
#[derive(Parser, Debug)]
#[command(name = "pumice-worker", version, about)]
struct Cli {
    /// Base64 MessagePack encoded task.
    task: Option<String>,

    /// Print the registered operation names and exit.
    #[arg(long)]
    list_ops: bool,
}

// ── main ────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let registry = ops::builtin_registry();

    // Parse errors must still produce a frame, so avoid `Cli::parse`.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if !e.use_stderr() {
                // --help / --version
                let _ = e.print();
                return ExitCode::SUCCESS;
            }
            return harness::report(&Outcome::error(format!("invalid arguments: {e}")));
        }
    };

    if cli.list_ops {
        for name in registry.names() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    debug!(has_task = cli.task.is_some(), "running task");
    harness::main(&registry)
}

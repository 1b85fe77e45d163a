mod cli;
mod jobs;

use std::cell::Cell;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use tracing::info;

use pumice::{load_dotenv, Pool, PoolConfig, TaskError, TaskId};

use crate::cli::CliArgs;
use crate::jobs::JobFile;

fn main() -> ExitCode {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Run every job and report whether all of them succeeded.
fn run(args: &CliArgs) -> Result<bool> {
    let config = load_config(args)?;
    let jobs = JobFile::load(&args.jobs)?;
    let tasks = jobs
        .tasks
        .iter()
        .map(|entry| entry.to_task())
        .collect::<Result<Vec<_>>>()?;

    info!(
        tasks = tasks.len(),
        worker = %config.worker.program.display(),
        max_concurrent = config.resolved_max_concurrent(),
        "running job file"
    );

    let failed = Cell::new(0usize);
    let failures = &failed;
    let started = Instant::now();
    let mut pool = Pool::new(config);
    for task in tasks {
        let op = task.op.clone();
        let handle = pool.add(task);
        let id = handle.id();
        let failed_op = op.clone();
        handle
            .on_success(move |data| print_line(id, &op, "success", "data", data))
            .on_failure(move |error: TaskError| {
                failures.set(failures.get() + 1);
                print_line(id, &failed_op, "error", "message", Value::String(error.message()));
            });
    }

    pool.run().context("pool run failed")?;

    let metrics = pool.metrics();
    eprintln!(
        "{} tasks: {} succeeded, {} failed in {:.2?} (peak {} workers)",
        metrics.completed(),
        metrics.succeeded,
        metrics.failed,
        started.elapsed(),
        metrics.peak_active,
    );
    Ok(failed.get() == 0)
}

fn load_config(args: &CliArgs) -> Result<PoolConfig> {
    let mut config = match &args.config {
        Some(path) => PoolConfig::from_file(path)
            .with_context(|| format!("failed to load pool config {}", path.display()))?,
        None => PoolConfig::from_env().context("invalid pool configuration")?,
    };
    if let Some(worker) = &args.worker {
        config.worker.program = worker.clone();
    }
    if let Some(concurrency) = args.concurrency {
        anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");
        config.max_concurrent = concurrency;
    }
    Ok(config)
}

fn print_line(id: TaskId, op: &str, status: &str, key: &str, value: Value) {
    let mut line = json!({ "task": id.index(), "op": op, "status": status });
    line[key] = value;
    println!("{line}");
}

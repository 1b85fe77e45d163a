use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::helpers::{default_worker_program, detect_logical_cores};

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of concurrently running workers. 0 = logical core count.
    #[serde(default)]
    pub max_concurrent: usize,

    /// How each worker process is started.
    #[serde(default)]
    pub worker: WorkerCommand,

    /// Bytes of each worker's stderr kept for logs and failure messages.
    #[serde(default = "default_stderr_capture_bytes")]
    pub stderr_capture_bytes: usize,
}

fn default_stderr_capture_bytes() -> usize {
    8 * 1024
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            worker: WorkerCommand::default(),
            stderr_capture_bytes: default_stderr_capture_bytes(),
        }
    }
}

impl PoolConfig {
    /// Resolve the concurrency degree (0 means detect the core count).
    pub fn resolved_max_concurrent(&self) -> usize {
        if self.max_concurrent == 0 {
            detect_logical_cores()
        } else {
            self.max_concurrent
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = worker;
        self
    }
}

/// Command line used to start a worker. The encoded task is appended after `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    /// Path to the worker binary (resolved through `PATH` if relative without separators).
    #[serde(default = "default_worker_program")]
    pub program: PathBuf,

    /// Arguments placed before the encoded task.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the worker process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self::new(default_worker_program())
    }
}

use thiserror::Error;

use crate::task::TaskId;

/// Errors returned by the pool itself.
///
/// Task-level failures never show up here: they are delivered to the task's
/// failure callback as a [`TaskError`](crate::TaskError).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("waiting on worker output failed: {0}")]
    Multiplex(#[from] nix::Error),
}

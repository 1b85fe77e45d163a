use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result of running one task inside a worker, as carried on the wire.
///
/// Tagged on `status`, so the MessagePack map reads
/// `{status: "success", data: ...}` or `{status: "error", message: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success { data: Value },
    Error { message: String },
}

impl Outcome {
    pub fn success(data: Value) -> Self {
        Self::Success { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Map onto the value handed to the success or failure callback.
    pub fn into_result(self) -> Result<Value, TaskError> {
        match self {
            Self::Success { data } => Ok(data),
            Self::Error { message } => Err(TaskError::Execution(message)),
        }
    }
}

/// Error delivered to a task's failure callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The operation itself reported a failure (or panicked) inside the worker.
    #[error("{0}")]
    Execution(String),

    /// The worker's output could not be decoded into an [`Outcome`].
    #[error("malformed worker output: {0}")]
    Decode(String),

    /// No worker process could be started for the task.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// Reading the worker's stdout failed before an outcome arrived.
    #[error("failed to read worker output: {0}")]
    Io(String),

    /// The worker closed its output without sending a complete outcome.
    #[error("worker exited without reporting an outcome ({status}){}", stderr_suffix(.stderr))]
    WorkerExited { status: String, stderr: String },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

impl TaskError {
    /// The failure text. For [`TaskError::Execution`] this is exactly the
    /// message the operation produced.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pumice::Task;

/// A job file: an ordered list of tasks.
///
/// ```toml
/// [[task]]
/// op = "add"
/// payload = [2, 2]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFile {
    #[serde(default, rename = "task")]
    pub tasks: Vec<JobEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEntry {
    pub op: String,
    /// Missing payloads run with `null`.
    #[serde(default)]
    pub payload: Option<toml::Value>,
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read job file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid job file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let jobs: Self = toml::from_str(content)?;
        if let Some(entry) = jobs.tasks.iter().find(|t| t.op.trim().is_empty()) {
            anyhow::bail!("task has an empty op name: {entry:?}");
        }
        Ok(jobs)
    }
}

impl JobEntry {
    pub fn to_task(&self) -> Result<Task> {
        let payload = match &self.payload {
            Some(value) => serde_json::to_value(value).with_context(|| {
                format!("payload of '{}' is not representable as JSON", self.op)
            })?,
            None => Value::Null,
        };
        Ok(Task::new(self.op.clone(), payload))
    }
}

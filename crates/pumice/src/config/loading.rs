use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::PoolError;

use super::types::PoolConfig;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

impl PoolConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, PoolError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults with environment overrides applied (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, PoolError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `PUMICE_MAX_CONCURRENT` → `max_concurrent`
    /// - `PUMICE_WORKER_PROGRAM` → `worker.program`
    /// - `PUMICE_STDERR_CAPTURE_BYTES` → `stderr_capture_bytes`
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the process environment in production).
    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PUMICE_MAX_CONCURRENT") {
            match v.parse::<usize>() {
                Ok(n) => self.max_concurrent = n,
                Err(_) => warn!(value = %v, "ignoring invalid PUMICE_MAX_CONCURRENT"),
            }
        }
        if let Some(v) = lookup("PUMICE_WORKER_PROGRAM") {
            self.worker.program = PathBuf::from(v);
        }
        if let Some(v) = lookup("PUMICE_STDERR_CAPTURE_BYTES") {
            match v.parse::<usize>() {
                Ok(n) => self.stderr_capture_bytes = n,
                Err(_) => warn!(value = %v, "ignoring invalid PUMICE_STDERR_CAPTURE_BYTES"),
            }
        }
    }
}

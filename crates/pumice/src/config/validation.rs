use super::types::PoolConfig;
use crate::error::PoolError;

impl PoolConfig {
    /// Validate the config after loading.
    pub fn validate(&self) -> Result<(), PoolError> {
        self.validate_worker_program()?;
        self.validate_worker_env()?;
        Ok(())
    }

    fn validate_worker_program(&self) -> Result<(), PoolError> {
        if self.worker.program.as_os_str().is_empty() {
            return Err(PoolError::Config("worker.program must not be empty".into()));
        }
        Ok(())
    }

    /// Env keys must be usable by `Command::env`.
    fn validate_worker_env(&self) -> Result<(), PoolError> {
        for key in self.worker.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(PoolError::Config(format!(
                    "invalid worker environment variable name '{key}'"
                )));
            }
        }
        Ok(())
    }
}

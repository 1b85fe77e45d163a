use std::path::PathBuf;

use tracing::debug;

/// Concurrency used when the core count cannot be determined.
pub const FALLBACK_CONCURRENCY: usize = 8;

const WORKER_BINARY: &str = "pumice-worker";

/// Number of logical cores, or [`FALLBACK_CONCURRENCY`] if detection fails.
pub fn detect_logical_cores() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            debug!(error = %e, fallback = FALLBACK_CONCURRENCY, "core count detection failed");
            FALLBACK_CONCURRENCY
        }
    }
}

/// `pumice-worker` next to the current executable if it exists, otherwise the
/// bare name so the OS resolves it through `PATH`.
pub(crate) fn default_worker_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(worker_file_name())))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(WORKER_BINARY))
}

fn worker_file_name() -> String {
    format!("{WORKER_BINARY}{}", std::env::consts::EXE_SUFFIX)
}

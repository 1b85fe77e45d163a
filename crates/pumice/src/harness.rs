//! Worker side of the protocol.
//!
//! A worker is started with the encoded task as its last argument. It decodes
//! the task, runs the named operation, and writes exactly one length-prefixed
//! outcome frame to stdout before exiting. Every failure on this side,
//! including a bad argument, an unknown operation or a panic, is reported in-band
//! as an [`Outcome::Error`].
//!
//! Host programs with their own operations build a registry and call
//! [`main`] from their worker binary:
//!
//! ```no_run
//! use pumice::{harness, OperationRegistry};
//!
//! fn main() -> std::process::ExitCode {
//!     let mut registry = OperationRegistry::new();
//!     registry
//!         .register_fn("double", |v| Ok(serde_json::json!(v.as_i64().unwrap_or(0) * 2)))
//!         .unwrap();
//!     harness::main(&registry)
//! }
//! ```

use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

use tracing::{debug, error};

use crate::codec::{self, CodecError};
use crate::operation::OperationRegistry;
use crate::outcome::Outcome;

/// Decode and run one encoded task.
pub fn execute(registry: &OperationRegistry, encoded: &str) -> Outcome {
    let task = match codec::decode_task(encoded) {
        Ok(task) => task,
        Err(e) => return Outcome::error(format!("failed to decode task: {e}")),
    };

    let Some(op) = registry.get(&task.op) else {
        return Outcome::error(format!("unknown operation '{}'", task.op));
    };

    debug!(op = %task.op, "executing task");
    match panic::catch_unwind(AssertUnwindSafe(|| op.execute(task.payload))) {
        Ok(Ok(data)) => Outcome::success(data),
        Ok(Err(e)) => Outcome::error(e.to_string()),
        Err(panic) => Outcome::error(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Encode, frame, and write an outcome, flushing before returning.
pub fn emit(outcome: &Outcome, out: &mut impl Write) -> Result<(), CodecError> {
    let body = match codec::encode_outcome(outcome) {
        Ok(body) => body,
        Err(e) => {
            let fallback = Outcome::error(format!("failed to encode outcome: {e}"));
            codec::encode_outcome(&fallback)?
        }
    };
    out.write_all(codec::frame(&body).as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Run the task given on the command line and report its outcome on stdout.
pub fn main(registry: &OperationRegistry) -> ExitCode {
    let outcome = match std::env::args().skip(1).last() {
        Some(encoded) => execute(registry, &encoded),
        None => Outcome::error("missing encoded task argument"),
    };
    report(&outcome)
}

/// Write `outcome` to stdout and pick the process exit code.
pub fn report(outcome: &Outcome) -> ExitCode {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    match emit(outcome, &mut lock) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "failed to write outcome");
            ExitCode::FAILURE
        }
    }
}

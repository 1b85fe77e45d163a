use std::io;

use serde_json::Value;
use tracing::{debug, warn};

use crate::codec;
use crate::outcome::TaskError;
use crate::slot::WorkerSlot;
use crate::task::TaskId;

use super::Pool;

impl<'a> Pool<'a> {
    /// Read what the task's worker has written and dispatch its outcome if
    /// one is now available.
    ///
    /// Returns `true` when the slot was freed.
    pub(super) fn collect(&mut self, id: TaskId) -> bool {
        let Some(slot) = self.active.get_mut(&id) else {
            return false;
        };
        let read = slot.read_stdout();
        let Some(result) = stdout_result(read, slot) else {
            return false;
        };
        let Some(slot) = self.active.remove(&id) else {
            return false;
        };

        self.metrics.record_completion(result.is_ok(), slot.elapsed());
        // Reaped even if the callback unwinds.
        let guard = SlotGuard(Some(slot));
        self.deliver(id, result);
        if let Some(slot) = guard.release() {
            self.reclaim(slot);
        }
        true
    }

    /// Invoke whichever callback matches `result`, at most once per task.
    pub(super) fn deliver(&mut self, id: TaskId, result: Result<Value, TaskError>) {
        let callbacks = self.queue.take_callbacks(id);
        match result {
            Ok(value) => {
                debug!(task = %id, "task succeeded");
                match callbacks.on_success {
                    Some(on_success) => on_success(value),
                    None => debug!(task = %id, "no success callback registered"),
                }
            }
            Err(error) => {
                warn!(task = %id, error = %error, "task failed");
                match callbacks.on_failure {
                    Some(on_failure) => on_failure(error),
                    None => debug!(task = %id, "no failure callback registered"),
                }
            }
        }
    }
}

/// Owns a slot whose outcome is being dispatched. Dropped while still
/// holding it (a panicking callback), it kills and reaps the worker.
struct SlotGuard(Option<WorkerSlot>);

impl SlotGuard {
    fn release(mut self) -> Option<WorkerSlot> {
        self.0.take()
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.0.take() {
            warn!(task = %slot.task_id(), "callback unwound, abandoning worker");
            slot.abandon();
        }
    }
}

/// Map one stdout read onto the task's result, `None` while the outcome is
/// still incomplete.
fn stdout_result(
    read: io::Result<()>,
    slot: &mut WorkerSlot,
) -> Option<Result<Value, TaskError>> {
    match read {
        Err(e) => Some(Err(TaskError::Io(e.to_string()))),
        Ok(()) => finished_result(slot),
    }
}

/// The task's result if the worker is done talking, `None` while a frame is
/// still arriving.
fn finished_result(slot: &mut WorkerSlot) -> Option<Result<Value, TaskError>> {
    let body = slot
        .frame()
        .complete()
        .map(|body| body.map(str::to_owned));

    match body {
        Ok(Some(body)) => Some(
            codec::decode_outcome(&body)
                .map_err(|e| TaskError::Decode(e.to_string()))
                .and_then(|outcome| outcome.into_result()),
        ),
        Ok(None) if slot.stdout_closed() => Some(Err(worker_exited(slot))),
        Ok(None) => None,
        Err(e) => Some(Err(TaskError::Decode(e.to_string()))),
    }
}

fn worker_exited(slot: &mut WorkerSlot) -> TaskError {
    // Pick up whatever the worker said on its way out.
    if let Err(e) = slot.read_stderr() {
        debug!(task = %slot.task_id(), error = %e, "stderr read failed");
    }
    let status = slot
        .try_status()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "still running".to_string());
    TaskError::WorkerExited {
        status,
        stderr: slot.stderr_text(),
    }
}

use tracing::{debug, warn};

use crate::codec;
use crate::outcome::TaskError;
use crate::slot::WorkerSlot;
use crate::task::TaskId;

use super::Pool;

impl<'a> Pool<'a> {
    /// Spawn workers until `max_concurrent` are running or the queue is exhausted.
    pub(super) fn fill(&mut self, max_concurrent: usize) {
        while self.active.len() < max_concurrent && self.spawn_next() {}
    }

    /// Hand the next queued task to a new worker.
    ///
    /// Returns `false` if no unspawned task is left. The cursor advances even
    /// when the worker cannot be started; that task is failed immediately with
    /// [`TaskError::Spawn`].
    pub(super) fn spawn_next(&mut self) -> bool {
        if self.next_to_spawn >= self.queue.len() {
            return false;
        }
        let id = TaskId(self.next_to_spawn);
        self.next_to_spawn += 1;

        let Some(task) = self.queue.take_task(id) else {
            warn!(task = %id, "task payload already taken, skipping");
            return true;
        };

        let encoded = match codec::encode_task(&task) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.fail_spawn(id, format!("failed to encode task: {e}"));
                return true;
            }
        };

        match WorkerSlot::spawn(
            id,
            &self.config.worker,
            &encoded,
            self.config.stderr_capture_bytes,
        ) {
            Ok(slot) => {
                debug!(task = %id, op = %task.op, pid = slot.pid(), "task started");
                self.active.insert(id, slot);
                self.metrics.record_spawn(self.active.len());
            }
            Err(e) => {
                self.fail_spawn(
                    id,
                    format!("{}: {e}", self.config.worker.program.display()),
                );
            }
        }
        true
    }

    fn fail_spawn(&mut self, id: TaskId, reason: String) {
        warn!(task = %id, reason = %reason, "could not start worker");
        self.metrics.record_spawn_failure();
        self.deliver(id, Err(TaskError::Spawn(reason)));
    }

    /// Close the slot's streams and wait for its process to exit.
    pub(super) fn reclaim(&mut self, slot: WorkerSlot) {
        let id = slot.task_id();
        let stderr = slot.stderr_text();
        match slot.reclaim() {
            Ok(status) => debug!(task = %id, %status, "worker reaped"),
            Err(e) => warn!(task = %id, error = %e, "failed to reap worker"),
        }
        if !stderr.trim().is_empty() {
            debug!(task = %id, stderr = %stderr.trim_end(), "worker stderr");
        }
    }

    /// Kill every running worker. Used when the run loop cannot continue.
    pub(super) fn abandon_active(&mut self) {
        let active = std::mem::take(&mut self.active);
        for (id, slot) in active {
            warn!(task = %id, "abandoning worker");
            slot.abandon();
        }
    }
}

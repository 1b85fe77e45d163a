use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::config::{PoolConfig, WorkerCommand};
use crate::error::PoolError;
use crate::metrics::PoolMetrics;
use crate::outcome::TaskError;
use crate::slot::WorkerSlot;
use crate::task::{Task, TaskId, TaskQueue};

/// Runs tasks in worker processes, at most `max_concurrent` at a time.
///
/// All state is owned by the pool and only touched from the thread that calls
/// [`Pool::run`]. Callbacks run on that thread too and may borrow from the
/// caller's scope for `'a`.
pub struct Pool<'a> {
    pub(super) config: PoolConfig,
    /// Submitted tasks and their callbacks, by submission index.
    pub(super) queue: TaskQueue<'a>,
    /// Index of the next task to hand to a worker.
    pub(super) next_to_spawn: usize,
    /// Running workers keyed by the task they execute.
    pub(super) active: BTreeMap<TaskId, WorkerSlot>,
    pub(super) metrics: PoolMetrics,
}

impl<'a> Pool<'a> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            queue: TaskQueue::new(),
            next_to_spawn: 0,
            active: BTreeMap::new(),
            metrics: PoolMetrics::default(),
        }
    }

    /// Pool with default settings and an explicit worker command.
    pub fn with_worker(worker: WorkerCommand) -> Self {
        Self::new(PoolConfig::default().with_worker(worker))
    }

    /// Queue a task. Attach callbacks through the returned handle.
    pub fn add(&mut self, task: Task) -> TaskHandle<'_, 'a> {
        let id = self.queue.push(task);
        debug!(task = %id, "task queued");
        TaskHandle { pool: self, id }
    }

    /// Handle to the most recently added task.
    pub fn last(&mut self) -> Option<TaskHandle<'_, 'a>> {
        let id = self.queue.last_id()?;
        Some(TaskHandle { pool: self, id })
    }

    pub fn on_success_for(
        &mut self,
        id: TaskId,
        f: impl FnOnce(Value) + 'a,
    ) -> Result<(), PoolError> {
        if self.queue.set_on_success(id, Box::new(f)) {
            Ok(())
        } else {
            Err(PoolError::UnknownTask(id))
        }
    }

    pub fn on_failure_for(
        &mut self,
        id: TaskId,
        f: impl FnOnce(TaskError) + 'a,
    ) -> Result<(), PoolError> {
        if self.queue.set_on_failure(id, Box::new(f)) {
            Ok(())
        } else {
            Err(PoolError::UnknownTask(id))
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Total tasks ever submitted.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Tasks not yet handed to a worker.
    pub fn pending(&self) -> usize {
        self.queue.len() - self.next_to_spawn
    }

    /// Workers currently running.
    pub fn active(&self) -> usize {
        self.active.len()
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

impl Default for Pool<'_> {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

/// Workers still running when the pool goes away (a run that unwound out of
/// a callback) are killed and reaped.
impl Drop for Pool<'_> {
    fn drop(&mut self) {
        if !self.active.is_empty() {
            self.abandon_active();
        }
    }
}

/// Returned by [`Pool::add`] to attach callbacks to the new task.
pub struct TaskHandle<'p, 'a> {
    pool: &'p mut Pool<'a>,
    id: TaskId,
}

impl<'p, 'a> TaskHandle<'p, 'a> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Called with the task's return value if it succeeds.
    pub fn on_success(self, f: impl FnOnce(Value) + 'a) -> Self {
        self.pool.queue.set_on_success(self.id, Box::new(f));
        self
    }

    /// Called with the error if the task fails, cannot be started, or its
    /// worker dies without reporting.
    pub fn on_failure(self, f: impl FnOnce(TaskError) + 'a) -> Self {
        self.pool.queue.set_on_failure(self.id, Box::new(f));
        self
    }
}

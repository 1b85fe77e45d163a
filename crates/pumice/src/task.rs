use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::outcome::TaskError;

/// Zero-based submission index of a task within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unit of work: the name of a registered operation plus its input.
///
/// Workers look `op` up in their [`OperationRegistry`](crate::OperationRegistry),
/// so only plain data ever crosses the process boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub op: String,
    #[serde(default)]
    pub payload: Value,
}

impl Task {
    pub fn new(op: impl Into<String>, payload: Value) -> Self {
        Self {
            op: op.into(),
            payload,
        }
    }

    /// Build a task from any serializable payload.
    pub fn from_serialize<T: Serialize>(
        op: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(op, serde_json::to_value(payload)?))
    }
}

pub type SuccessCallback<'a> = Box<dyn FnOnce(Value) + 'a>;
pub type FailureCallback<'a> = Box<dyn FnOnce(TaskError) + 'a>;

/// Callback pair registered for one task. Either side may be unset.
#[derive(Default)]
pub struct Callbacks<'a> {
    pub on_success: Option<SuccessCallback<'a>>,
    pub on_failure: Option<FailureCallback<'a>>,
}

impl fmt::Debug for Callbacks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct Entry<'a> {
    /// Dropped once the task has been handed to a worker.
    task: Option<Task>,
    /// Dropped once the outcome has been dispatched.
    callbacks: Option<Callbacks<'a>>,
}

/// Submission-ordered tasks and the callbacks registered for each.
#[derive(Debug, Default)]
pub struct TaskQueue<'a> {
    entries: Vec<Entry<'a>>,
}

impl<'a> TaskQueue<'a> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a task and return its submission index.
    pub fn push(&mut self, task: Task) -> TaskId {
        let id = TaskId(self.entries.len());
        self.entries.push(Entry {
            task: Some(task),
            callbacks: Some(Callbacks::default()),
        });
        id
    }

    /// Total number of tasks ever submitted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_id(&self) -> Option<TaskId> {
        self.entries.len().checked_sub(1).map(TaskId)
    }

    /// Take the task out for spawning. Returns `None` if it was already taken.
    pub fn take_task(&mut self, id: TaskId) -> Option<Task> {
        self.entries.get_mut(id.0).and_then(|e| e.task.take())
    }

    /// Replace the success callback. Returns `false` if the task is unknown
    /// or its outcome was already dispatched.
    pub fn set_on_success(&mut self, id: TaskId, f: SuccessCallback<'a>) -> bool {
        match self.callbacks_mut(id) {
            Some(cbs) => {
                cbs.on_success = Some(f);
                true
            }
            None => false,
        }
    }

    /// Replace the failure callback. Same contract as [`Self::set_on_success`].
    pub fn set_on_failure(&mut self, id: TaskId, f: FailureCallback<'a>) -> bool {
        match self.callbacks_mut(id) {
            Some(cbs) => {
                cbs.on_failure = Some(f);
                true
            }
            None => false,
        }
    }

    /// Remove the callbacks for dispatch. A second call yields an empty pair.
    pub fn take_callbacks(&mut self, id: TaskId) -> Callbacks<'a> {
        self.entries
            .get_mut(id.0)
            .and_then(|e| e.callbacks.take())
            .unwrap_or_default()
    }

    fn callbacks_mut(&mut self, id: TaskId) -> Option<&mut Callbacks<'a>> {
        self.entries.get_mut(id.0).and_then(|e| e.callbacks.as_mut())
    }
}

//! Process-pool task scheduler.
//!
//! Tasks are named operations with a JSON payload. [`Pool::run`] spawns one
//! worker process per task (at most `max_concurrent` at a time), waits on all
//! worker output pipes at once, and hands each decoded outcome to the task's
//! success or failure callback on the calling thread.

pub mod codec;
pub mod config;
pub mod error;
pub mod harness;
pub mod metrics;
pub mod operation;
pub mod ops;
pub mod outcome;
pub mod pool;
pub mod slot;
pub mod task;

pub use codec::{CodecError, FrameBuffer};
pub use config::{
    detect_logical_cores, load_dotenv, PoolConfig, WorkerCommand, FALLBACK_CONCURRENCY,
};
pub use error::PoolError;
pub use metrics::PoolMetrics;
pub use operation::{FnOperation, Operation, OperationError, OperationRegistry, RegistryError};
pub use outcome::{Outcome, TaskError};
pub use pool::{Pool, TaskHandle};
pub use task::{FailureCallback, SuccessCallback, Task, TaskId, TaskQueue};

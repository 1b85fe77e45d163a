//! The process-pool scheduler.
//!
//! Split into focused submodules:
//! - `core`: Pool struct, task submission, callback wiring, accessors
//! - `slots`: spawning workers into free slots and reclaiming them
//! - `completion`: the blocking run loop multiplexing over worker pipes
//! - `dispatch`: turning a finished worker into a callback invocation

mod completion;
mod core;
mod dispatch;
mod slots;
#[cfg(test)]
mod tests;

pub use self::core::{Pool, TaskHandle};

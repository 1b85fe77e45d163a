use std::time::Instant;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, error, info};

use crate::error::PoolError;
use crate::task::TaskId;

use super::Pool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl<'a> Pool<'a> {
    /// Run every queued task to completion using the configured concurrency.
    ///
    /// Blocks until each task submitted so far has had its outcome
    /// dispatched. Tasks added afterwards are picked up by the next call.
    pub fn run(&mut self) -> Result<(), PoolError> {
        self.run_with(self.config.resolved_max_concurrent())
    }

    /// Like [`Pool::run`] with an explicit limit on simultaneous workers.
    pub fn run_with(&mut self, max_concurrent: usize) -> Result<(), PoolError> {
        if max_concurrent == 0 {
            return Err(PoolError::Config(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        let started = Instant::now();
        info!(max_concurrent, pending = self.pending(), "pool run starting");

        self.fill(max_concurrent);
        while !self.active.is_empty() {
            let ready = match self.wait_ready() {
                Ok(ready) => ready,
                Err(e) => {
                    error!(error = %e, active = self.active.len(), "poll failed, abandoning run");
                    self.abandon_active();
                    return Err(PoolError::Multiplex(e));
                }
            };

            for (id, stream) in ready {
                match stream {
                    Stream::Stderr => self.drain_stderr(id),
                    Stream::Stdout => {
                        if self.collect(id) {
                            self.fill(max_concurrent);
                        }
                    }
                }
            }
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            succeeded = self.metrics.succeeded,
            failed = self.metrics.failed,
            peak_active = self.metrics.peak_active,
            "pool run finished"
        );
        Ok(())
    }

    /// Block until at least one worker stream is readable or hung up.
    ///
    /// Stderr entries come before the stdout entry of the same task so its
    /// diagnostics are captured before the outcome is dispatched.
    fn wait_ready(&self) -> Result<Vec<(TaskId, Stream)>, Errno> {
        let mut keys = Vec::with_capacity(self.active.len() * 2);
        let mut fds = Vec::with_capacity(self.active.len() * 2);
        for (&id, slot) in &self.active {
            if let Some(fd) = slot.stderr_fd() {
                keys.push((id, Stream::Stderr));
                fds.push(PollFd::new(fd, PollFlags::POLLIN));
            }
            keys.push((id, Stream::Stdout));
            fds.push(PollFd::new(slot.stdout_fd(), PollFlags::POLLIN));
        }

        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => break,
                Err(Errno::EINTR) => {
                    debug!("poll interrupted, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(keys
            .into_iter()
            .zip(fds.iter())
            .filter(|(_, fd)| fd.revents().is_some_and(|r| !r.is_empty()))
            .map(|(key, _)| key)
            .collect())
    }

    fn drain_stderr(&mut self, id: TaskId) {
        if let Some(slot) = self.active.get_mut(&id) {
            if let Err(e) = slot.read_stderr() {
                debug!(task = %id, error = %e, "stderr read failed");
            }
        }
    }
}

//! One running worker process and the pipes bound to it.

use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tracing::debug;

use crate::codec::FrameBuffer;
use crate::config::WorkerCommand;
use crate::task::TaskId;

const READ_CHUNK: usize = 8 * 1024;

/// A live worker bound to the task it is executing.
///
/// Exists only while the process runs: created by [`WorkerSlot::spawn`],
/// consumed by [`WorkerSlot::reclaim`].
#[derive(Debug)]
pub struct WorkerSlot {
    task_id: TaskId,
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
    frame: FrameBuffer,
    stdout_eof: bool,
    stderr_buf: Vec<u8>,
    stderr_limit: usize,
    stderr_eof: bool,
    started: Instant,
}

impl WorkerSlot {
    /// Start `worker` with `encoded` as its final argument.
    ///
    /// All three standard streams are piped; stdout and stderr are switched to
    /// non-blocking mode before this returns.
    pub fn spawn(
        task_id: TaskId,
        worker: &WorkerCommand,
        encoded: &str,
        stderr_limit: usize,
    ) -> io::Result<Self> {
        let mut child = Command::new(&worker.program)
            .args(&worker.args)
            .arg(encoded)
            .envs(&worker.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        match Self::bind_streams(&mut child) {
            Ok((stdin, stdout, stderr)) => {
                debug!(task = %task_id, pid = child.id(), "worker spawned");
                Ok(Self {
                    task_id,
                    child,
                    stdin,
                    stdout,
                    stderr,
                    frame: FrameBuffer::new(),
                    stdout_eof: false,
                    stderr_buf: Vec::new(),
                    stderr_limit,
                    stderr_eof: false,
                    started: Instant::now(),
                })
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(e)
            }
        }
    }

    fn bind_streams(child: &mut Child) -> io::Result<(ChildStdin, ChildStdout, ChildStderr)> {
        let missing = |name: &str| {
            io::Error::new(io::ErrorKind::Other, format!("{name} was not captured"))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;
        set_nonblocking(&stdout)?;
        set_nonblocking(&stderr)?;
        Ok((stdin, stdout, stderr))
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn stdout_fd(&self) -> BorrowedFd<'_> {
        self.stdout.as_fd()
    }

    /// Stderr while it is still worth polling.
    pub fn stderr_fd(&self) -> Option<BorrowedFd<'_>> {
        (!self.stderr_eof).then(|| self.stderr.as_fd())
    }

    /// Drain everything currently readable on stdout into the frame buffer.
    pub fn read_stdout(&mut self) -> io::Result<()> {
        if self.stdout_eof {
            return Ok(());
        }
        let mut sink = |bytes: &[u8]| self.frame.extend(bytes);
        self.stdout_eof = drain(&mut self.stdout, &mut sink)?;
        Ok(())
    }

    /// Drain stderr, keeping at most `stderr_limit` bytes.
    ///
    /// A read error stops further polling of stderr; stdout is unaffected.
    pub fn read_stderr(&mut self) -> io::Result<()> {
        if self.stderr_eof {
            return Ok(());
        }
        let limit = self.stderr_limit;
        let buf = &mut self.stderr_buf;
        let mut sink = |bytes: &[u8]| {
            let room = limit.saturating_sub(buf.len());
            buf.extend_from_slice(&bytes[..bytes.len().min(room)]);
        };
        match drain(&mut self.stderr, &mut sink) {
            Ok(eof) => {
                self.stderr_eof = eof;
                Ok(())
            }
            Err(e) => {
                self.stderr_eof = true;
                Err(e)
            }
        }
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn stdout_closed(&self) -> bool {
        self.stdout_eof
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr_buf).into_owned()
    }

    /// Exit status if the process has already terminated, without blocking.
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Close all three streams and wait for the process to exit.
    pub fn reclaim(self) -> io::Result<ExitStatus> {
        let Self {
            mut child,
            stdin,
            stdout,
            stderr,
            ..
        } = self;
        drop(stdin);
        drop(stdout);
        drop(stderr);
        child.wait()
    }

    /// Kill the process and reap it. Used when the pool gives up on a run.
    pub fn abandon(mut self) {
        if let Err(e) = self.child.kill() {
            debug!(task = %self.task_id, error = %e, "kill failed");
        }
        let _ = self.reclaim();
    }
}

/// Read until the pipe would block or reaches end of file. Returns `true` on EOF.
fn drain(reader: &mut impl Read, sink: &mut impl FnMut(&[u8])) -> io::Result<bool> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(true),
            Ok(n) => sink(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn set_nonblocking(fd: &impl AsRawFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

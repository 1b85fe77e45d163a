use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

use serde_json::{json, Value};

use crate::codec;
use crate::config::{PoolConfig, WorkerCommand};
use crate::error::PoolError;
use crate::outcome::{Outcome, TaskError};
use crate::pool::Pool;
use crate::task::{Task, TaskId};

/// Worker that ignores its task and runs `script` under `/bin/sh`.
fn sh(script: &str) -> WorkerCommand {
    WorkerCommand::new("/bin/sh").with_args(["-c", script, "worker"])
}

fn framed(outcome: &Outcome) -> String {
    codec::frame(&codec::encode_outcome(outcome).unwrap())
}

/// Worker that prints `outcome` as a complete frame.
fn replying(outcome: &Outcome) -> WorkerCommand {
    sh(&format!("printf '%s' '{}'", framed(outcome)))
}

fn pool_with<'a>(worker: WorkerCommand, max_concurrent: usize) -> Pool<'a> {
    Pool::new(
        PoolConfig::default()
            .with_worker(worker)
            .with_max_concurrent(max_concurrent),
    )
}

#[test]
fn success_reaches_success_callback() {
    let got = RefCell::new(None);
    let failed = Cell::new(false);

    let mut pool = Pool::new(
        PoolConfig::default()
            .with_worker(replying(&Outcome::success(json!(4))))
            .with_max_concurrent(2),
    );
    pool.add(Task::new("add", json!([2, 2])))
        .on_success(|v| *got.borrow_mut() = Some(v))
        .on_failure(|_| failed.set(true));
    pool.run().unwrap();

    assert_eq!(*got.borrow(), Some(json!(4)));
    assert!(!failed.get());
    assert_eq!(pool.metrics().succeeded, 1);
    assert_eq!(pool.active(), 0);
    assert_eq!(pool.pending(), 0);
}

#[test]
fn error_outcome_reaches_failure_callback() {
    let got = RefCell::new(None);

    let mut pool = Pool::new(
        PoolConfig::default()
            .with_worker(replying(&Outcome::error("boom")))
            .with_max_concurrent(1),
    );
    pool.add(Task::new("fail", json!("boom")))
        .on_success(|_| panic!("success callback must not run"))
        .on_failure(|e| *got.borrow_mut() = Some(e));
    pool.run().unwrap();

    let err = got.borrow_mut().take().unwrap();
    assert_eq!(err, TaskError::Execution("boom".into()));
    assert_eq!(err.message(), "boom");
    assert_eq!(pool.metrics().failed, 1);
}

#[test]
fn tasks_without_callbacks_still_complete() {
    let mut pool = pool_with(replying(&Outcome::success(Value::Null)), 2);
    pool.add(Task::new("echo", Value::Null));
    pool.add(Task::new("echo", Value::Null));
    pool.run().unwrap();

    assert_eq!(pool.metrics().completed(), 2);
    assert_eq!(pool.metrics().spawned, 2);
}

#[test]
fn spawn_failure_is_reported_and_run_continues() {
    let got = RefCell::new(Vec::new());

    let mut pool = Pool::new(
        PoolConfig::default()
            .with_worker(WorkerCommand::new("/nonexistent/pumice-worker"))
            .with_max_concurrent(1),
    );
    for _ in 0..3 {
        pool.add(Task::new("echo", Value::Null))
            .on_failure(|e| got.borrow_mut().push(e));
    }
    pool.run().unwrap();

    let errors = got.borrow();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| matches!(e, TaskError::Spawn(_))));
    assert!(errors[0].message().contains("/nonexistent/pumice-worker"));
    assert_eq!(pool.metrics().spawn_failures, 3);
    assert_eq!(pool.metrics().spawned, 0);
}

#[test]
fn silent_exit_reports_worker_exited_with_stderr() {
    let got = RefCell::new(None);

    let mut pool = pool_with(sh("echo 'out of cheese' >&2; exit 3"), 1);
    pool.add(Task::new("exit", json!(3)))
        .on_failure(|e| *got.borrow_mut() = Some(e));
    pool.run().unwrap();

    let err = got.borrow_mut().take();
    match err {
        Some(TaskError::WorkerExited { stderr, .. }) => {
            assert!(stderr.contains("out of cheese"), "stderr was {stderr:?}");
        }
        other => panic!("expected WorkerExited, got {other:?}"),
    }
}

#[test]
fn garbage_output_is_a_decode_failure() {
    let got = RefCell::new(Vec::new());

    let mut pool = pool_with(sh("printf 'definitely not a frame'"), 2);
    pool.add(Task::new("echo", Value::Null))
        .on_failure(|e| got.borrow_mut().push(e));
    pool.run().unwrap();

    // Well-framed body that is not base64.
    let mut pool = pool_with(sh("printf '5:!!!!!'"), 2);
    pool.add(Task::new("echo", Value::Null))
        .on_failure(|e| got.borrow_mut().push(e));
    pool.run().unwrap();

    let errors = got.borrow();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| matches!(e, TaskError::Decode(_))));
}

#[test]
fn frame_split_across_writes_is_reassembled() {
    let frame = framed(&Outcome::success(json!({"split": true})));
    let (head, tail) = frame.split_at(frame.len() / 2);
    let script = format!("printf '%s' '{head}'; sleep 0.2; printf '%s' '{tail}'");
    let got = RefCell::new(None);

    let mut pool = pool_with(sh(&script), 1);
    pool.add(Task::new("echo", Value::Null))
        .on_success(|v| *got.borrow_mut() = Some(v));
    pool.run().unwrap();

    assert_eq!(*got.borrow(), Some(json!({"split": true})));
}

#[test]
fn concurrency_never_exceeds_limit() {
    let script = format!(
        "sleep 0.1; printf '%s' '{}'",
        framed(&Outcome::success(json!("done")))
    );
    let fired = Cell::new(0);

    let mut pool = pool_with(sh(&script), 2);
    for _ in 0..5 {
        pool.add(Task::new("sleep", Value::Null))
            .on_success(|_| fired.set(fired.get() + 1));
    }
    assert_eq!(pool.pending(), 5);
    pool.run().unwrap();

    assert_eq!(fired.get(), 5);
    assert_eq!(pool.metrics().peak_active, 2);
    assert_eq!(pool.metrics().spawned, 5);
}

#[test]
fn pool_can_run_again_with_new_tasks() {
    let fired = Cell::new(0);

    let mut pool = pool_with(replying(&Outcome::success(json!(1))), 2);
    pool.add(Task::new("echo", json!(1)))
        .on_success(|_| fired.set(fired.get() + 1));
    pool.run().unwrap();
    assert_eq!(fired.get(), 1);

    // Nothing queued: returns immediately and dispatches nothing new.
    pool.run().unwrap();
    assert_eq!(fired.get(), 1);

    pool.add(Task::new("echo", json!(2)))
        .on_success(|_| fired.set(fired.get() + 1));
    pool.run().unwrap();
    assert_eq!(fired.get(), 2);
    assert_eq!(pool.len(), 2);
}

#[test]
fn zero_concurrency_is_rejected() {
    let mut pool = pool_with(replying(&Outcome::success(Value::Null)), 1);
    pool.add(Task::new("echo", Value::Null));
    assert!(matches!(pool.run_with(0), Err(PoolError::Config(_))));
    assert_eq!(pool.pending(), 1);
}

#[test]
fn callbacks_by_id_and_last_handle() {
    let got = RefCell::new(Vec::new());

    let mut pool = pool_with(replying(&Outcome::success(json!("ok"))), 2);
    assert!(pool.last().is_none());

    let first = pool.add(Task::new("echo", Value::Null)).id();
    pool.add(Task::new("echo", Value::Null));
    pool.on_success_for(first, |v| got.borrow_mut().push(("first", v)))
        .unwrap();
    pool.last()
        .unwrap()
        .on_success(|v| got.borrow_mut().push(("last", v)));

    assert!(matches!(
        pool.on_success_for(TaskId(9), |_| {}),
        Err(PoolError::UnknownTask(TaskId(9)))
    ));
    assert!(pool.on_failure_for(TaskId(9), |_| {}).is_err());

    pool.run().unwrap();

    let mut seen: Vec<_> = got.borrow().iter().map(|(name, _)| *name).collect();
    seen.sort_unstable();
    assert_eq!(seen, ["first", "last"]);

    // Dispatched tasks no longer accept callbacks.
    assert!(pool.on_failure_for(first, |_| {}).is_err());
}

#[cfg(target_os = "linux")]
#[test]
fn panicking_callback_does_not_leak_workers() {
    let dir = tempfile::tempdir().unwrap();
    let pids = dir.path().join("pids");
    // Report the outcome, then linger so the other worker is still running
    // when the first callback unwinds.
    let script = format!(
        "echo $$ >> '{}'; printf '%s' '{}'; sleep 5",
        pids.display(),
        framed(&Outcome::success(Value::Null))
    );

    let mut pool = pool_with(sh(&script), 2);
    for _ in 0..2 {
        pool.add(Task::new("echo", Value::Null))
            .on_success(|_| panic!("callback bug"));
    }
    let unwound = panic::catch_unwind(AssertUnwindSafe(|| pool.run()));
    assert!(unwound.is_err());
    assert_eq!(pool.active(), 1);
    drop(pool);

    let pids = std::fs::read_to_string(&pids).unwrap();
    assert!(!pids.trim().is_empty());
    for pid in pids.split_whitespace() {
        // A zombie keeps its /proc entry until it is reaped.
        assert!(
            !std::path::Path::new(&format!("/proc/{pid}")).exists(),
            "worker {pid} was not reaped"
        );
    }
}

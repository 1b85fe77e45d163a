//! End-to-end tests driving real `pumice-worker` processes through the pool.
//!
//! Covers outcome routing, the concurrency bound, completion-order dispatch
//! and slot backfilling.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use pumice::{Pool, PoolConfig, Task, TaskError, WorkerCommand};

const WORKER: &str = env!("CARGO_BIN_EXE_pumice-worker");

fn pool<'a>(max_concurrent: usize) -> Pool<'a> {
    Pool::new(
        PoolConfig::default()
            .with_worker(WorkerCommand::new(WORKER))
            .with_max_concurrent(max_concurrent),
    )
}

fn sleep_task(ms: u64, value: Value) -> Task {
    Task::new("sleep", json!({"ms": ms, "value": value}))
}

/// `(started_ms, finished_ms)` reported by the `sleep` operation.
fn interval(out: &Value) -> (i64, i64) {
    (
        out["started_ms"].as_i64().unwrap(),
        out["finished_ms"].as_i64().unwrap(),
    )
}

#[test]
fn add_reaches_success_callback() {
    let got = RefCell::new(None);

    let mut pool = pool(2);
    pool.add(Task::new("add", json!([2, 2])))
        .on_success(|v| *got.borrow_mut() = Some(v))
        .on_failure(|e| panic!("unexpected failure: {e}"));
    pool.run().unwrap();

    assert_eq!(*got.borrow(), Some(json!(4)));
}

#[test]
fn failures_keep_their_message() {
    let got = RefCell::new(Vec::new());

    let mut pool = pool(3);
    pool.add(Task::new("fail", json!("boom")))
        .on_success(|_| panic!("fail must not succeed"))
        .on_failure(|e| got.borrow_mut().push(("fail", e)));
    pool.add(Task::new("panic", json!("kaboom")))
        .on_failure(|e| got.borrow_mut().push(("panic", e)));
    pool.add(Task::new("nope", Value::Null))
        .on_failure(|e| got.borrow_mut().push(("nope", e)));
    pool.run().unwrap();

    let mut errors = got.take();
    errors.sort_by_key(|(name, _)| *name);
    assert_eq!(
        errors,
        vec![
            ("fail", TaskError::Execution("boom".into())),
            ("nope", TaskError::Execution("unknown operation 'nope'".into())),
            ("panic", TaskError::Execution("kaboom".into())),
        ]
    );
}

#[test]
fn worker_that_exits_early_is_reported() {
    let got = RefCell::new(None);

    let mut pool = pool(1);
    pool.add(Task::new("exit", json!(7)))
        .on_failure(|e| *got.borrow_mut() = Some(e));
    pool.run().unwrap();

    let err = got.take().expect("failure callback ran");
    assert!(
        matches!(err, TaskError::WorkerExited { .. }),
        "got {err:?}"
    );
}

#[test]
fn at_most_k_tasks_overlap() {
    let intervals = RefCell::new(Vec::new());
    let fired = RefCell::new(0);

    let mut pool = pool(2);
    for i in 0..5 {
        pool.add(sleep_task(150, json!(i))).on_success(|out| {
            *fired.borrow_mut() += 1;
            intervals.borrow_mut().push(interval(&out));
        });
    }
    pool.run().unwrap();

    assert_eq!(*fired.borrow(), 5);
    assert!(pool.metrics().peak_active <= 2);

    let intervals = intervals.borrow();
    for &(start, _) in intervals.iter() {
        let running = intervals
            .iter()
            .filter(|&&(s, f)| s <= start && start < f)
            .count();
        assert!(running <= 2, "{running} tasks running at {start}");
    }
}

#[test]
fn results_dispatch_in_completion_order() {
    let order = RefCell::new(Vec::new());

    let mut pool = pool(2);
    pool.add(sleep_task(400, json!("slow")))
        .on_success(|out| order.borrow_mut().push(out["value"].clone()));
    pool.add(sleep_task(10, json!("fast")))
        .on_success(|out| order.borrow_mut().push(out["value"].clone()));
    pool.run().unwrap();

    assert_eq!(*order.borrow(), vec![json!("fast"), json!("slow")]);
}

#[test]
fn single_slot_runs_tasks_back_to_back() {
    let intervals = RefCell::new(Vec::new());

    let mut pool = pool(1);
    for i in 0..3 {
        pool.add(sleep_task(50, json!(i)))
            .on_success(|out| intervals.borrow_mut().push(interval(&out)));
    }
    pool.run().unwrap();

    let intervals = intervals.borrow();
    assert_eq!(intervals.len(), 3);
    for pair in intervals.windows(2) {
        assert!(pair[1].0 >= pair[0].1, "next task started before previous finished");
    }
    assert_eq!(pool.metrics().peak_active, 1);
}

#[test]
fn parallel_run_beats_serial_time() {
    let mut pool = pool(5);
    for i in 0..10 {
        pool.add(sleep_task(100, json!(i)));
    }

    let started = Instant::now();
    pool.run().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(pool.metrics().succeeded, 10);
    // Serial execution would need at least one second.
    assert!(elapsed < Duration::from_millis(900), "took {elapsed:?}");
}

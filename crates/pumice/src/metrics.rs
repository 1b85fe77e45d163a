use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters kept by a [`Pool`](crate::Pool) across runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolMetrics {
    /// Worker processes started.
    pub spawned: u64,
    /// Tasks dispatched to their success path.
    pub succeeded: u64,
    /// Tasks dispatched to their failure path (spawn failures included).
    pub failed: u64,
    /// Tasks for which no worker could be started.
    pub spawn_failures: u64,
    /// Highest number of simultaneously active workers observed.
    pub peak_active: usize,
    /// Mean time from spawn to dispatched outcome.
    pub avg_task_duration: Duration,
    /// When the most recent outcome was dispatched.
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl PoolMetrics {
    /// Record a successful spawn; `active` includes the new worker.
    pub fn record_spawn(&mut self, active: usize) {
        self.spawned += 1;
        self.peak_active = self.peak_active.max(active);
    }

    pub fn record_spawn_failure(&mut self) {
        self.spawn_failures += 1;
        self.failed += 1;
        self.last_completed_at = Some(Utc::now());
    }

    /// Record a dispatched worker outcome.
    pub fn record_completion(&mut self, success: bool, duration: Duration) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.last_completed_at = Some(Utc::now());

        // Incremental mean over worker-backed completions only.
        let count = self.succeeded + self.failed - self.spawn_failures;
        self.avg_task_duration = if count <= 1 {
            duration
        } else {
            let prev_nanos = self.avg_task_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    /// Outcomes dispatched so far, both paths.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

//! Run-wide result counters and the end-of-run summary

use crate::crawler::TaskOutcome;
use crate::state::{WorkerExit, WorkerState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// Snapshot of the shared counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TallyCounts {
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl TallyCounts {
    pub fn total(&self) -> u64 {
        self.success + self.failed + self.skipped
    }
}

/// Process-wide success/failed/skipped counters
///
/// The only state every worker writes to; all updates go through one lock.
#[derive(Debug, Default)]
pub struct ResultsTally {
    counts: Mutex<TallyCounts>,
}

impl ResultsTally {
    pub fn new() -> Self {
        Self::default()
    }

    fn counts(&self) -> MutexGuard<'_, TallyCounts> {
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records one finished target; extraction failures count as failed
    pub fn record(&self, outcome: TaskOutcome) {
        let mut counts = self.counts();
        match outcome {
            TaskOutcome::Success => counts.success += 1,
            TaskOutcome::Failed | TaskOutcome::ExtractionFailed => counts.failed += 1,
            TaskOutcome::Skipped => counts.skipped += 1,
        }
    }

    /// Records targets skipped before they were ever enqueued
    pub fn record_skipped(&self, count: u64) {
        self.counts().skipped += count;
    }

    pub fn snapshot(&self) -> TallyCounts {
        *self.counts()
    }
}

/// Everything reported about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub workers: usize,

    /// Targets in the work set after deduplication and resume truncation
    pub total_targets: usize,

    pub success: u64,
    pub failed: u64,
    pub skipped: u64,

    /// Targets still queued when the pool shut down
    pub unprocessed: usize,

    pub worker_states: Vec<WorkerState>,
}

impl RunSummary {
    /// True when no target failed and none was left behind
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.unprocessed == 0
    }

    pub fn workers_lost(&self) -> usize {
        self.worker_states
            .iter()
            .filter(|w| matches!(w.exit, Some(WorkerExit::SessionLost | WorkerExit::Aborted)))
            .count()
    }
}

/// Logs the final counts
pub fn log_summary(summary: &RunSummary) {
    tracing::info!(
        "Run finished in {:.1}s: {} succeeded, {} failed, {} skipped ({} targets, {} workers)",
        summary.elapsed_secs,
        summary.success,
        summary.failed,
        summary.skipped,
        summary.total_targets,
        summary.workers
    );

    if summary.unprocessed > 0 {
        tracing::warn!(
            "{} targets were left unprocessed; re-run to resume",
            summary.unprocessed
        );
    }

    let lost = summary.workers_lost();
    if lost > 0 {
        tracing::error!("{} of {} workers were lost during the run", lost, summary.workers);
    }

    for worker in &summary.worker_states {
        tracing::debug!(
            "Worker {}: {} ok, {} failed, {} skipped, {} extraction failures, {} session restarts, exit {:?}",
            worker.id,
            worker.successes,
            worker.failures,
            worker.skipped,
            worker.extraction_failures,
            worker.session_restarts,
            worker.exit
        );
    }
}

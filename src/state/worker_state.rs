use crate::crawler::TaskOutcome;
use serde::Serialize;

/// Why a worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExit {
    /// Received a stop sentinel after the queue drained
    Stopped,
    /// Waited longer than the idle timeout for work
    Idle,
    /// Its session died and could not be replaced
    SessionLost,
    /// Did not finish within the join timeout and was aborted
    Aborted,
}

/// Per-worker counters
///
/// Owned by exactly one worker task; the coordinator only reads it after the
/// worker has been joined.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerState {
    pub id: usize,
    pub successes: u64,
    pub failures: u64,
    pub skipped: u64,
    pub extraction_failures: u64,
    pub session_restarts: u64,

    /// Id of the session the worker currently owns
    pub session_id: Option<u64>,

    pub exit: Option<WorkerExit>,
}

impl WorkerState {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            successes: 0,
            failures: 0,
            skipped: 0,
            extraction_failures: 0,
            session_restarts: 0,
            session_id: None,
            exit: None,
        }
    }

    /// Counts one finished target; extraction failures are also failures
    pub fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Success => self.successes += 1,
            TaskOutcome::Failed => self.failures += 1,
            TaskOutcome::ExtractionFailed => {
                self.failures += 1;
                self.extraction_failures += 1;
            }
            TaskOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Tracks the owned session, counting a restart when its id changed
    pub fn observe_session(&mut self, session_id: u64) {
        if let Some(previous) = self.session_id {
            if previous != session_id {
                self.session_restarts += 1;
            }
        }
        self.session_id = Some(session_id);
    }

    /// Targets this worker took off the queue and finished
    pub fn processed(&self) -> u64 {
        self.successes + self.failures + self.skipped
    }
}

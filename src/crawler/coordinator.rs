//! Crawler coordinator - worker pool orchestration
//!
//! This module contains the pool that turns a work set into finished targets:
//! - Deduplicating, ordering and resume-truncating the work set
//! - Skipping targets whose output is already committed
//! - Running N workers, each owning exactly one browser session
//! - Draining the queue, dispatching stop sentinels and joining the workers
//! - Producing the run summary

use crate::config::Config;
use crate::crawler::fetcher::PageFetchController;
use crate::crawler::politeness::PolitenessDelay;
use crate::crawler::queue::{Dequeued, TargetQueue, WorkerRegistration};
use crate::crawler::session::Session;
use crate::output::{log_summary, write_run_summary, ResultsTally, RunSummary};
use crate::state::{WorkerExit, WorkerState};
use crate::url::Target;
use crate::LadleError;
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// How one dequeued target ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,

    /// The page loaded but produced no record
    ExtractionFailed,

    /// Output already existed
    Skipped,
}

/// The work done for one target once a worker has dequeued it
#[async_trait]
pub trait TargetJob: Send + Sync {
    /// Whether the target's output is already committed
    fn is_complete(&self, target: &Target) -> bool;

    /// Processes one target on the worker's session
    ///
    /// `LadleError::SessionUnavailable` means the session is gone and the
    /// worker must stop; any other error is counted as a failure.
    async fn run(
        &self,
        controller: &PageFetchController,
        session: &mut Session,
        target: &Target,
    ) -> Result<TaskOutcome, LadleError>;
}

/// Pool sizing and pacing
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub workers: usize,
    pub headless: bool,
    pub queue_idle_timeout: Duration,
    pub join_timeout: Duration,
    pub politeness: PolitenessDelay,
}

impl PoolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.crawler.workers.max(1),
            headless: config.crawler.headless,
            queue_idle_timeout: config.crawler.queue_idle_timeout(),
            join_timeout: config.crawler.join_timeout(),
            politeness: PolitenessDelay::from_millis(
                config.crawler.politeness_min_ms,
                config.crawler.politeness_max_ms,
            ),
        }
    }
}

/// Sorts and deduplicates the work set, then drops everything ordered before
/// `resume_from`
///
/// An unknown resume target leaves the work set untouched.
pub fn prepare_work_set(mut targets: Vec<Target>, resume_from: Option<&Target>) -> Vec<Target> {
    targets.sort();
    targets.dedup();

    if let Some(resume) = resume_from {
        match targets.iter().position(|t| t == resume) {
            Some(index) => {
                info!("Resuming from {} (skipping {} targets)", resume, index);
                targets.drain(..index);
            }
            None => warn!("Resume target {} is not in the work set; starting from the top", resume),
        }
    }
    targets
}

/// Main crawler coordinator structure
pub struct Coordinator {
    controller: Arc<PageFetchController>,
    job: Arc<dyn TargetJob>,
    settings: PoolSettings,
    resume_from: Option<Target>,
    summary_dir: Option<PathBuf>,
}

impl Coordinator {
    pub fn new(
        controller: Arc<PageFetchController>,
        job: Arc<dyn TargetJob>,
        settings: PoolSettings,
    ) -> Self {
        Self {
            controller,
            job,
            settings,
            resume_from: None,
            summary_dir: None,
        }
    }

    /// Starts the run at `target` instead of at the top of the work set
    pub fn resume_from(mut self, target: Option<Target>) -> Self {
        self.resume_from = target;
        self
    }

    /// Persists the run summary into `dir` once the pool has shut down
    pub fn write_summary_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.summary_dir = Some(dir.into());
        self
    }

    /// Runs the pool over `targets` until every target is processed or no
    /// worker is left
    ///
    /// Target, session and worker failures never fail the run; they show up
    /// in the returned summary.
    pub async fn run(&self, targets: Vec<Target>) -> Result<RunSummary, LadleError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let work_set = prepare_work_set(targets, self.resume_from.as_ref());
        let total_targets = work_set.len();
        let tally = Arc::new(ResultsTally::new());

        let (done, pending): (Vec<Target>, Vec<Target>) =
            work_set.into_iter().partition(|t| self.job.is_complete(t));
        if !done.is_empty() {
            info!("{} targets already have output, skipping them", done.len());
            tally.record_skipped(done.len() as u64);
        }

        let queue = Arc::new(TargetQueue::new());
        queue.extend(pending);
        info!(
            "Starting {} workers for {} targets",
            self.settings.workers,
            queue.total_enqueued()
        );

        let mut handles = Vec::with_capacity(self.settings.workers);
        for id in 0..self.settings.workers {
            let registration = queue.register_worker();
            let worker = Worker {
                id,
                queue: Arc::clone(&queue),
                controller: Arc::clone(&self.controller),
                job: Arc::clone(&self.job),
                tally: Arc::clone(&tally),
                settings: self.settings.clone(),
            };
            let handle = tokio::spawn(
                worker
                    .run(registration)
                    .instrument(info_span!("worker", id)),
            );
            handles.push((id, handle));
        }

        // Shutdown cannot start until every real target is acknowledged
        queue.join().await;
        if queue.live_workers() == 0 && queue.unfinished() > 0 {
            error!(
                "Every worker has exited with {} targets unfinished",
                queue.unfinished()
            );
        }
        queue.push_sentinels(self.settings.workers);

        let mut worker_states = Vec::with_capacity(handles.len());
        for (id, mut handle) in handles {
            match tokio::time::timeout(self.settings.join_timeout, &mut handle).await {
                Ok(Ok(state)) => worker_states.push(state),
                Ok(Err(e)) => {
                    error!("Worker {} panicked: {}", id, e);
                    let mut state = WorkerState::new(id);
                    state.exit = Some(WorkerExit::Aborted);
                    worker_states.push(state);
                }
                Err(_) => {
                    warn!(
                        "Worker {} did not stop within {:?}, aborting it",
                        id, self.settings.join_timeout
                    );
                    handle.abort();
                    let mut state = WorkerState::new(id);
                    state.exit = Some(WorkerExit::Aborted);
                    worker_states.push(state);
                }
            }
        }

        let counts = tally.snapshot();
        let summary = RunSummary {
            started_at,
            elapsed_secs: start.elapsed().as_secs_f64(),
            workers: self.settings.workers,
            total_targets,
            success: counts.success,
            failed: counts.failed,
            skipped: counts.skipped,
            unprocessed: queue.remaining(),
            worker_states,
        };
        log_summary(&summary);

        if let Some(dir) = &self.summary_dir {
            match write_run_summary(dir, &summary) {
                Ok(path) => debug!("Run summary written to {}", path.display()),
                Err(e) => warn!("Failed to write run summary: {}", e),
            }
        }

        Ok(summary)
    }
}

/// One pool slot and everything it needs; owns its session exclusively
struct Worker {
    id: usize,
    queue: Arc<TargetQueue>,
    controller: Arc<PageFetchController>,
    job: Arc<dyn TargetJob>,
    tally: Arc<ResultsTally>,
    settings: PoolSettings,
}

impl Worker {
    async fn run(self, registration: WorkerRegistration) -> WorkerState {
        // Held until the loop ends so the producer can tell when the pool is gone
        let _registration = registration;
        let mut state = WorkerState::new(self.id);
        let sessions = self.controller.sessions();

        let mut session = match sessions.create(self.settings.headless).await {
            Ok(session) => session,
            Err(e) => {
                error!("CRITICAL: worker {} could not start a browser session: {}", self.id, e);
                state.exit = Some(WorkerExit::SessionLost);
                return state;
            }
        };
        state.observe_session(session.id());
        debug!("Worker {} started with session {}", self.id, session.id());

        loop {
            let target = match self.queue.pop(self.settings.queue_idle_timeout).await {
                Dequeued::Target(target) => target,
                Dequeued::Stop => {
                    debug!("Worker {} received stop signal", self.id);
                    state.exit = Some(WorkerExit::Stopped);
                    break;
                }
                Dequeued::Idle => {
                    info!(
                        "Worker {} idle for {:?}, no more work",
                        self.id, self.settings.queue_idle_timeout
                    );
                    state.exit = Some(WorkerExit::Idle);
                    break;
                }
            };

            info!("Processing {}", target);
            let result = AssertUnwindSafe(self.job.run(&self.controller, &mut session, &target))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(LadleError::TaskPanicked(panic_message(&*panic)))
                });
            match result {
                Ok(outcome) => {
                    self.tally.record(outcome);
                    state.record(outcome);
                    state.observe_session(session.id());
                    self.queue.task_done();
                    debug!("Finished {} ({:?})", target, outcome);
                }
                Err(LadleError::SessionUnavailable { session: lost, source }) => {
                    self.tally.record(TaskOutcome::Failed);
                    state.record(TaskOutcome::Failed);
                    self.queue.task_done();
                    error!(
                        "CRITICAL: worker {} lost session {} and could not replace it: {}",
                        self.id, lost, source
                    );
                    state.exit = Some(WorkerExit::SessionLost);
                    return state;
                }
                Err(e) => {
                    error!("Error processing {}: {}", target, e);
                    self.tally.record(TaskOutcome::Failed);
                    state.record(TaskOutcome::Failed);
                    self.queue.task_done();

                    session = match sessions.restart(Some(session), self.settings.headless).await {
                        Ok(fresh) => fresh,
                        Err(e) => {
                            error!(
                                "CRITICAL: worker {} could not restart its browser session: {}",
                                self.id, e
                            );
                            state.exit = Some(WorkerExit::SessionLost);
                            return state;
                        }
                    };
                    state.observe_session(session.id());
                }
            }

            self.settings.politeness.pause().await;
        }

        sessions.dispose(&session).await;
        state
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Resilience tests for the worker pool and fetch controller
//!
//! Stub drivers stand in for the browser so hangs, crashes and challenge
//! pages can be produced on demand.

mod common;

use async_trait::async_trait;
use common::{test_config, Behavior, MemoryStore, StubFactory};
use ladle::crawler::{
    build_controller, Coordinator, Dequeued, FetchReport, PageFetchController, PoolSettings,
    RecipeJob, Session, TargetJob, TargetQueue, TaskOutcome,
};
use ladle::LadleError;
use ladle::extract::RecipeExtractor;
use ladle::state::WorkerExit;
use ladle::storage::{write_atomic, write_atomic_with};
use ladle::url::{target_slug, Target};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const BASE: &str = "https://site.com/";

fn targets(count: usize) -> Vec<Target> {
    (0..count)
        .map(|i| Target::parse(&format!("{}recipe-{:03}/", BASE, i)).unwrap())
        .collect()
}

fn recipe_job(store: Arc<MemoryStore>) -> Arc<RecipeJob> {
    let extractor = RecipeExtractor::new(".wprm-recipe-summary", "Cook Mode").unwrap();
    Arc::new(RecipeJob::new(store, Arc::new(extractor), BASE, true))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resume_skips_committed_targets() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), BASE);
    let factory = Arc::new(StubFactory::new(Behavior::Serve));
    let probe = Arc::clone(&factory.probe);

    let work = targets(5);
    let store = Arc::new(MemoryStore::default());
    for target in &work[..3] {
        store.insert(&target_slug(target.as_str(), BASE), b"{}");
    }

    let summary = Coordinator::new(
        build_controller(&config, factory),
        recipe_job(Arc::clone(&store)),
        PoolSettings::from_config(&config),
    )
    .run(work)
    .await
    .unwrap();

    assert_eq!(probe.navigations(), 2);
    assert_eq!(summary.success, 2);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn test_hung_loads_exhaust_attempt_budget() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), BASE);
    config.crawler.watchdog_timeout_ms = 100;
    config.crawler.max_attempts = 3;

    let factory = Arc::new(StubFactory::new(Behavior::Hang));
    let probe = Arc::clone(&factory.probe);
    let controller = build_controller(&config, factory);
    let mut session = controller.sessions().create(true).await.unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        controller.fetch(&mut session, "https://site.com/slow/"),
    )
    .await
    .expect("controller must not hang")
    .unwrap();

    assert!(matches!(report, FetchReport::GivenUp { attempts: 3 }));
    assert_eq!(probe.navigations(), 3);
    // One session per attempt plus the replacement handed back to the worker
    assert_eq!(probe.launches(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_are_never_shared() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), BASE);
    config.crawler.workers = 4;

    let factory = Arc::new(StubFactory::new(Behavior::Serve));
    let probe = Arc::clone(&factory.probe);
    let store = Arc::new(MemoryStore::default());

    let summary = Coordinator::new(
        build_controller(&config, factory),
        recipe_job(Arc::clone(&store)),
        PoolSettings::from_config(&config),
    )
    .run(targets(60))
    .await
    .unwrap();

    assert_eq!(probe.violations(), 0);
    assert_eq!(summary.success, 60);
    assert_eq!(probe.launches(), 4);
    assert_eq!(store.len(), 60);
}

#[test]
fn test_interrupted_write_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let fresh = dir.path().join("foods").join("soup.json");

    let result = write_atomic_with(&fresh, |file| {
        file.write_all(b"{\"URL\": \"https://site.com/so")?;
        Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "killed"))
    });
    assert!(result.is_err());
    assert!(!fresh.exists());

    let existing = dir.path().join("foods").join("stew.json");
    write_atomic(&existing, b"{\"URL\": \"https://site.com/stew/\"}").unwrap();
    let result = write_atomic_with(&existing, |file| {
        file.write_all(b"{\"URL\"")?;
        Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "killed"))
    });
    assert!(result.is_err());
    assert_eq!(
        std::fs::read_to_string(&existing).unwrap(),
        "{\"URL\": \"https://site.com/stew/\"}"
    );

    // Only the committed file remains; no temporary siblings leak
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("foods"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_early_sentinels_never_strand_targets() {
    let queue = Arc::new(TargetQueue::new());
    queue.push_sentinels(3);
    queue.extend(targets(40));

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut processed = 0usize;
                loop {
                    match queue.pop(Duration::from_secs(1)).await {
                        Dequeued::Target(_) => {
                            processed += 1;
                            queue.task_done();
                            tokio::task::yield_now().await;
                        }
                        Dequeued::Stop | Dequeued::Idle => return processed,
                    }
                }
            })
        })
        .collect();

    let mut processed = 0;
    for consumer in consumers {
        processed += consumer.await.unwrap();
    }
    assert_eq!(processed + queue.remaining(), queue.total_enqueued());
    assert_eq!(processed, 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_drain_accounts_for_every_target() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), BASE);
    config.crawler.workers = 3;

    let factory = Arc::new(StubFactory::new(Behavior::Serve));
    let summary = Coordinator::new(
        build_controller(&config, factory),
        recipe_job(Arc::new(MemoryStore::default())),
        PoolSettings::from_config(&config),
    )
    .run(targets(25))
    .await
    .unwrap();

    let processed = summary.success + summary.failed + summary.skipped;
    assert_eq!(processed as usize + summary.unprocessed, summary.total_targets);
    assert_eq!(summary.unprocessed, 0);
    assert!(summary
        .worker_states
        .iter()
        .all(|w| w.exit == Some(WorkerExit::Stopped)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_survives_losing_every_worker() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), BASE);
    config.crawler.workers = 2;

    // Both initial sessions launch, every replacement fails
    let factory = Arc::new(StubFactory::new(Behavior::Broken).with_launch_limit(2));
    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        Coordinator::new(
            build_controller(&config, factory),
            recipe_job(Arc::new(MemoryStore::default())),
            PoolSettings::from_config(&config),
        )
        .run(targets(10)),
    )
    .await
    .expect("pool must shut down once every worker is gone")
    .unwrap();

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.unprocessed, 8);
    assert_eq!(summary.workers_lost(), 2);
    assert!(summary
        .worker_states
        .iter()
        .all(|w| w.exit == Some(WorkerExit::SessionLost)));
}

#[tokio::test]
async fn test_unresolved_challenge_restarts_and_stays_bounded() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), BASE);
    config.crawler.watchdog_timeout_ms = 500;
    config.crawler.max_attempts = 3;
    config.challenge.auto_timeout_ms = 50;

    let factory = Arc::new(StubFactory::new(Behavior::Challenge));
    let probe = Arc::clone(&factory.probe);
    let controller = build_controller(&config, factory);
    let mut session = controller.sessions().create(true).await.unwrap();

    let budget = Duration::from_millis(3 * 500);
    let started = Instant::now();
    let report = tokio::time::timeout(
        budget,
        controller.fetch(&mut session, "https://site.com/guarded/"),
    )
    .await
    .expect("challenge handling exceeded max_attempts x watchdog")
    .unwrap();

    assert!(matches!(report, FetchReport::GivenUp { attempts: 3 }));
    assert!(started.elapsed() < budget);
    assert_eq!(probe.navigations(), 3);
    assert_eq!(probe.launches(), 4);
}

/// Succeeds on every target except one, where it panics mid-run
struct TrippingJob {
    trip_on: Target,
}

#[async_trait]
impl TargetJob for TrippingJob {
    fn is_complete(&self, _target: &Target) -> bool {
        false
    }

    async fn run(
        &self,
        _controller: &PageFetchController,
        _session: &mut Session,
        target: &Target,
    ) -> Result<TaskOutcome, LadleError> {
        if *target == self.trip_on {
            panic!("extractor hit an unexpected layout");
        }
        Ok(TaskOutcome::Success)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_job_counts_as_failure_and_worker_continues() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), BASE);
    let factory = Arc::new(StubFactory::new(Behavior::Serve));
    let probe = Arc::clone(&factory.probe);

    let work = targets(10);
    let job = Arc::new(TrippingJob {
        trip_on: work[3].clone(),
    });

    // The queue idle timeout is 5s; a stranded target would stall the drain past it
    let summary = tokio::time::timeout(
        Duration::from_secs(3),
        Coordinator::new(
            build_controller(&config, factory),
            job,
            PoolSettings::from_config(&config),
        )
        .run(work),
    )
    .await
    .expect("a panicking job must not stall the drain")
    .unwrap();

    assert_eq!(summary.success, 9);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.unprocessed, 0);
    assert!(summary
        .worker_states
        .iter()
        .all(|w| w.exit == Some(WorkerExit::Stopped)));
    // Two initial sessions plus the replacement after the panic
    assert_eq!(probe.launches(), 3);
}

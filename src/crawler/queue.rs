//! Shared target queue for the worker pool
//!
//! This module handles:
//! - FIFO hand-out of targets to workers with a bounded idle wait
//! - Stop sentinels, one per worker, pushed after the queue drains
//! - Acknowledgement of finished targets so the producer can wait for a drain
//! - Tracking of live workers so a drain wait cannot outlive the pool

use crate::url::Target;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// What a worker got from the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeued {
    Target(Target),
    /// Stop sentinel; the worker should exit
    Stop,
    /// Nothing arrived within the idle timeout
    Idle,
}

#[derive(Debug, Default)]
struct QueueState {
    /// `None` entries are stop sentinels
    items: VecDeque<Option<Target>>,

    /// Targets enqueued but not yet acknowledged with `task_done`
    unfinished: usize,

    live_workers: usize,
    total_enqueued: usize,
}

/// Blocking FIFO of targets shared by every worker
///
/// Each queued item carries exactly one semaphore permit, so a worker waiting
/// in `pop` wakes only when there is something to take.
#[derive(Debug)]
pub struct TargetQueue {
    state: Mutex<QueueState>,
    available: Semaphore,
    changed: Notify,
}

impl Default for TargetQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Semaphore::new(0),
            changed: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, target: Target) {
        {
            let mut state = self.state();
            state.items.push_back(Some(target));
            state.unfinished += 1;
            state.total_enqueued += 1;
        }
        self.available.add_permits(1);
    }

    pub fn extend<I: IntoIterator<Item = Target>>(&self, targets: I) {
        for target in targets {
            self.push(target);
        }
    }

    /// Pushes one stop sentinel per worker
    pub fn push_sentinels(&self, count: usize) {
        {
            let mut state = self.state();
            for _ in 0..count {
                state.items.push_back(None);
            }
        }
        self.available.add_permits(count);
    }

    /// Takes the next item, waiting at most `idle` for one to arrive
    ///
    /// A sentinel is only handed out once no real target is left, so a stop
    /// signal pushed early can never strand queued work.
    pub async fn pop(&self, idle: Duration) -> Dequeued {
        let permit = match tokio::time::timeout(idle, self.available.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Dequeued::Stop,
            Err(_) => return Dequeued::Idle,
        };
        permit.forget();

        let mut state = self.state();
        let next = match state.items.iter().position(Option::is_some) {
            Some(pos) => state.items.remove(pos),
            None => state.items.pop_front(),
        };
        match next {
            Some(Some(target)) => Dequeued::Target(target),
            _ => Dequeued::Stop,
        }
    }

    /// Acknowledges one dequeued target as finished, whatever its outcome
    pub fn task_done(&self) {
        let drained = {
            let mut state = self.state();
            state.unfinished = state.unfinished.saturating_sub(1);
            state.unfinished == 0
        };
        if drained {
            self.changed.notify_waiters();
        }
    }

    /// Registers a worker; the returned guard unregisters it on drop
    ///
    /// Register before spawning the worker so `join` never sees a pool that
    /// has not started yet as an empty one.
    pub fn register_worker(self: &Arc<Self>) -> WorkerRegistration {
        self.state().live_workers += 1;
        WorkerRegistration {
            queue: Arc::clone(self),
        }
    }

    fn settled(&self) -> bool {
        let state = self.state();
        state.unfinished == 0 || state.live_workers == 0
    }

    /// Waits until every enqueued target is acknowledged, or no worker is
    /// left to acknowledge them
    pub async fn join(&self) {
        loop {
            // Created before the check so a notification in between is not lost
            let notified = self.changed.notified();
            if self.settled() {
                return;
            }
            notified.await;
        }
    }

    /// Real targets still waiting in the queue
    pub fn remaining(&self) -> usize {
        self.state().items.iter().filter(|i| i.is_some()).count()
    }

    pub fn unfinished(&self) -> usize {
        self.state().unfinished
    }

    pub fn total_enqueued(&self) -> usize {
        self.state().total_enqueued
    }

    pub fn live_workers(&self) -> usize {
        self.state().live_workers
    }
}

/// Keeps a worker counted as live while it exists
#[derive(Debug)]
pub struct WorkerRegistration {
    queue: Arc<TargetQueue>,
}

impl Drop for WorkerRegistration {
    fn drop(&mut self) {
        let none_left = {
            let mut state = self.queue.state();
            state.live_workers = state.live_workers.saturating_sub(1);
            state.live_workers == 0
        };
        if none_left {
            self.queue.changed.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(path: &str) -> Target {
        Target::parse(&format!("https://site.com/{}/", path)).unwrap()
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TargetQueue::new();
        queue.push(target("a"));
        queue.push(target("b"));

        assert_eq!(queue.pop(Duration::from_millis(10)).await, Dequeued::Target(target("a")));
        assert_eq!(queue.pop(Duration::from_millis(10)).await, Dequeued::Target(target("b")));
    }

    #[tokio::test]
    async fn test_empty_queue_goes_idle() {
        let queue = TargetQueue::new();
        assert_eq!(queue.pop(Duration::from_millis(20)).await, Dequeued::Idle);
    }

    #[tokio::test]
    async fn test_early_sentinel_never_skips_targets() {
        let queue = TargetQueue::new();
        queue.push_sentinels(1);
        queue.push(target("a"));
        queue.push(target("b"));

        assert_eq!(queue.pop(Duration::from_millis(10)).await, Dequeued::Target(target("a")));
        assert_eq!(queue.pop(Duration::from_millis(10)).await, Dequeued::Target(target("b")));
        assert_eq!(queue.pop(Duration::from_millis(10)).await, Dequeued::Stop);
        assert_eq!(queue.pop(Duration::from_millis(10)).await, Dequeued::Idle);
    }

    #[tokio::test]
    async fn test_join_waits_for_acknowledgement() {
        let queue = Arc::new(TargetQueue::new());
        let _worker = queue.register_worker();
        queue.push(target("a"));

        let popped = queue.pop(Duration::from_millis(10)).await;
        assert!(matches!(popped, Dequeued::Target(_)));

        // Popped but not acknowledged: join must still block
        let pending = tokio::time::timeout(Duration::from_millis(50), queue.join()).await;
        assert!(pending.is_err());

        queue.task_done();
        tokio::time::timeout(Duration::from_secs(1), queue.join())
            .await
            .unwrap();
        assert_eq!(queue.unfinished(), 0);
    }

    #[tokio::test]
    async fn test_join_returns_when_pool_is_gone() {
        let queue = Arc::new(TargetQueue::new());
        let worker = queue.register_worker();
        queue.push(target("a"));
        queue.push(target("b"));

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.join().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(worker);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue.remaining(), 2);
        assert_eq!(queue.live_workers(), 0);
    }

    #[tokio::test]
    async fn test_waiting_pop_wakes_on_push() {
        let queue = Arc::new(TargetQueue::new());
        let popper = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(target("late"));

        assert_eq!(popper.await.unwrap(), Dequeued::Target(target("late")));
        assert_eq!(queue.total_enqueued(), 1);
    }
}

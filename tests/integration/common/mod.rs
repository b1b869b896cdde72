//! Shared fixtures for the integration tests: a scratch configuration, stub
//! browser drivers with a reentrancy guard, and an in-memory result store

#![allow(dead_code)]

use async_trait::async_trait;
use ladle::browser::{BrowserDriver, Cookie, DriverError, DriverFactory, LaunchOptions};
use ladle::config::{parse_config, Config};
use ladle::storage::{ResultStore, StorageResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const RECIPE_HTML: &str = r#"<html><body>
<div class="wprm-recipe">
  <div class="wprm-recipe-summary">A quick weeknight soup.</div>
  <div class="wprm-recipe-meta-container"><div><span>Prep Time</span> <span>5 mins</span></div></div>
  <button>Cook Mode</button>
  <ul><li class="wprm-recipe-ingredient">1 onion</li></ul>
  <div class="wprm-recipe-instruction">Simmer.</div>
</div>
</body></html>"#;

pub const CHALLENGE_HTML: &str =
    "<html><head><title>Just a moment...</title></head><body>Checking your browser</body></html>";

/// Parses a configuration rooted in `dir` with timings small enough for tests
pub fn test_config(dir: &Path, base_url: &str) -> Config {
    let toml = format!(
        r#"
[crawler]
workers = 2
max-attempts = 3
watchdog-timeout-ms = 2000
page-load-timeout-ms = 2000
queue-idle-timeout-ms = 5000
join-timeout-ms = 5000
politeness-min-ms = 0
politeness-max-ms = 2
backoff-base-ms = 1
restart-delay-ms = 1
headless = true

[challenge]
auto-timeout-ms = 50
poll-interval-ms = 5
manual-timeout-ms = 50
manual-poll-interval-ms = 5

[site]
base-url = "{base}"
targets-file = "{dir}/targets.txt"

[discovery]
max-page-number = 20
max-empty-pages = 2

[output]
output-dir = "{dir}/output"
combined-file = "{dir}/combined.txt"
"#,
        base = base_url,
        dir = dir.display()
    );
    parse_config(&toml).expect("test config must be valid")
}

/// What every handle built by a `StubFactory` does on `navigate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Loads instantly and serves `RECIPE_HTML`
    Serve,
    /// Never returns from `navigate`
    Hang,
    /// Loads, but the page is always an interstitial
    Challenge,
    /// Every navigation fails with a fatal driver error
    Broken,
}

/// Counters shared by every handle of one factory
#[derive(Debug, Default)]
pub struct Probe {
    pub launches: AtomicUsize,
    pub navigations: AtomicUsize,
    /// Calls made on a handle while another call on it was still running
    pub violations: AtomicUsize,
    pub visited: Mutex<Vec<String>>,
}

impl Probe {
    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }
}

pub struct StubDriver {
    behavior: Behavior,
    probe: Arc<Probe>,
    busy: AtomicBool,
    last_url: Mutex<Option<String>>,
}

/// Marks its driver idle again when dropped
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl StubDriver {
    fn enter(&self) -> BusyGuard<'_> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.probe.violations.fetch_add(1, Ordering::SeqCst);
        }
        BusyGuard(&self.busy)
    }
}

#[async_trait]
impl BrowserDriver for StubDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let _guard = self.enter();
        self.probe.navigations.fetch_add(1, Ordering::SeqCst);
        self.probe.visited.lock().unwrap().push(url.to_string());
        *self.last_url.lock().unwrap() = Some(url.to_string());
        match self.behavior {
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            Behavior::Broken => Err(DriverError::Fatal("browser crashed".to_string())),
            Behavior::Serve | Behavior::Challenge => {
                // Give other workers a chance to interleave
                tokio::task::yield_now().await;
                Ok(())
            }
        }
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        let _guard = self.enter();
        tokio::task::yield_now().await;
        Ok(match self.behavior {
            Behavior::Challenge => CHALLENGE_HTML.to_string(),
            _ => RECIPE_HTML.to_string(),
        })
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let _guard = self.enter();
        Ok(self.last_url.lock().unwrap().clone().unwrap_or_default())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError> {
        let _guard = self.enter();
        Ok(Vec::new())
    }

    async fn add_cookies(&self, _cookies: &[Cookie]) -> Result<(), DriverError> {
        let _guard = self.enter();
        Ok(())
    }

    async fn reload(&self) -> Result<(), DriverError> {
        let _guard = self.enter();
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<(), DriverError> {
        let _guard = self.enter();
        Ok(())
    }

    async fn close_windows(&self) -> Result<(), DriverError> {
        let _guard = self.enter();
        Ok(())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let _guard = self.enter();
        Ok(())
    }
}

/// Builds `StubDriver`s; fails every launch after `launch_limit`
pub struct StubFactory {
    pub behavior: Behavior,
    pub probe: Arc<Probe>,
    pub launch_limit: Option<usize>,
}

impl StubFactory {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            probe: Arc::new(Probe::default()),
            launch_limit: None,
        }
    }

    pub fn with_launch_limit(mut self, limit: usize) -> Self {
        self.launch_limit = Some(limit);
        self
    }
}

#[async_trait]
impl DriverFactory for StubFactory {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn BrowserDriver>, DriverError> {
        let n = self.probe.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.launch_limit {
            if n >= limit {
                return Err(DriverError::Launch("no browser available".to_string()));
            }
        }
        Ok(Arc::new(StubDriver {
            behavior: self.behavior,
            probe: Arc::clone(&self.probe),
            busy: AtomicBool::new(false),
            last_url: Mutex::new(None),
        }))
    }
}

/// Result store kept in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn insert(&self, key: &str, bytes: &[u8]) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

impl ResultStore for MemoryStore {
    fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    fn commit(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        self.insert(key, bytes);
        Ok(())
    }
}

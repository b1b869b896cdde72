//! Session lifecycle management
//!
//! A `Session` wraps exactly one browser handle. The `SessionManager` builds
//! sessions with launch retries, replaces broken ones after a quiescence delay
//! and tears them down step by step without ever letting a failed step block
//! the next one.

use crate::browser::{BrowserDriver, DriverError, DriverFactory, LaunchOptions};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Launch attempts before the final best-effort one
const LAUNCH_RETRIES: u32 = 3;

/// One exclusive browser handle, owned by a single worker
pub struct Session {
    id: u64,
    driver: Arc<dyn BrowserDriver>,
    headless: bool,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    pub fn headless(&self) -> bool {
        self.headless
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("headless", &self.headless)
            .finish()
    }
}

/// Timing knobs for session construction and teardown
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// First launch backoff; doubles with every failed attempt
    pub launch_backoff: Duration,

    /// Pause between disposing a session and creating its replacement
    pub restart_delay: Duration,

    /// Upper bound for each teardown step
    pub dispose_step_timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            launch_backoff: Duration::from_secs(1),
            restart_delay: Duration::from_millis(1_500),
            dispose_step_timeout: Duration::from_secs(5),
        }
    }
}

/// Creates, restarts and disposes sessions
pub struct SessionManager {
    factory: Arc<dyn DriverFactory>,
    options: LaunchOptions,
    gui_size: (u32, u32),
    policy: SessionPolicy,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        options: LaunchOptions,
        gui_size: (u32, u32),
        policy: SessionPolicy,
    ) -> Self {
        Self {
            factory,
            options,
            gui_size,
            policy,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    fn options_for(&self, headless: bool) -> LaunchOptions {
        LaunchOptions {
            headless,
            ..self.options.clone()
        }
    }

    /// Builds a new session, retrying launch failures with exponential backoff
    ///
    /// After the retries a last launch is attempted; only its failure is
    /// reported to the caller.
    pub async fn create(&self, headless: bool) -> Result<Session, DriverError> {
        let options = self.options_for(headless);

        for attempt in 0..LAUNCH_RETRIES {
            debug!("Creating browser session (attempt {})", attempt + 1);
            match self.factory.launch(&options).await {
                Ok(driver) => return Ok(self.wrap(driver, headless)),
                Err(e) => {
                    let backoff = self.policy.launch_backoff * 2u32.pow(attempt);
                    error!(
                        "Failed to create browser session on attempt {}: {} (retrying in {:?})",
                        attempt + 1,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        info!("Creating browser session (last attempt)");
        let driver = self
            .factory
            .launch(&options)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        Ok(self.wrap(driver, headless))
    }

    fn wrap(&self, driver: Arc<dyn BrowserDriver>, headless: bool) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Browser session {} ready", id);
        Session {
            id,
            driver,
            headless,
        }
    }

    /// Disposes `old` (if any), waits out the quiescence delay, then creates
    /// a fresh session
    pub async fn restart(&self, old: Option<Session>, headless: bool) -> Result<Session, DriverError> {
        if let Some(old) = old {
            warn!("Restarting browser session {}", old.id);
            self.dispose(&old).await;
        }
        tokio::time::sleep(self.policy.restart_delay).await;
        self.create(headless).await
    }

    /// Replaces `session` in place with a fresh one of the same mode
    ///
    /// On failure `session` still holds the disposed handle and must not be
    /// used again.
    pub async fn renew(&self, session: &mut Session) -> Result<(), DriverError> {
        warn!("Restarting browser session {}", session.id);
        self.dispose(session).await;
        tokio::time::sleep(self.policy.restart_delay).await;
        *session = self.create(session.headless).await?;
        Ok(())
    }

    /// Tears a session down: clear cookies, close windows, terminate
    ///
    /// Every step runs regardless of how the previous one ended.
    pub async fn dispose(&self, session: &Session) {
        self.dispose_driver(&format!("session {}", session.id), session.driver.as_ref())
            .await;
    }

    /// Same teardown for a handle that never became a `Session`
    pub async fn dispose_driver(&self, label: &str, driver: &dyn BrowserDriver) {
        let limit = self.policy.dispose_step_timeout;

        match tokio::time::timeout(limit, driver.clear_cookies()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("{}: clearing cookies failed: {}", label, e),
            Err(_) => debug!("{}: clearing cookies timed out", label),
        }

        match tokio::time::timeout(limit, driver.close_windows()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("{}: closing windows failed: {}", label, e),
            Err(_) => debug!("{}: closing windows timed out", label),
        }

        match tokio::time::timeout(limit, driver.quit()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("{}: quit failed: {}", label, e),
            Err(_) => debug!("{}: quit timed out", label),
        }
    }

    /// Launches a standalone visible handle for supervised challenge solving
    pub async fn launch_visible(&self) -> Result<Arc<dyn BrowserDriver>, DriverError> {
        let (width, height) = self.gui_size;
        self.factory
            .launch(&self.options.visible(width, height))
            .await
    }
}

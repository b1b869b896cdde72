//! Anti-bot interstitial detection and resolution
//!
//! Detection is a plain substring check of the page source against the
//! configured signatures. Resolution first waits for the interstitial to clear
//! on its own; in interactive runs a visible browser can be opened so a person
//! can solve it, after which its cookies are carried into the worker's session.

use crate::browser::BrowserDriver;
use crate::config::ChallengeConfig;
use crate::crawler::session::{Session, SessionManager};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[async_trait]
pub trait ChallengeResolver: Send + Sync {
    fn is_challenge_present(&self, html: &str) -> bool;

    /// Polls the session's current page until the interstitial disappears or
    /// `timeout` elapses
    async fn wait_for_auto_resolution(&self, session: &Session, timeout: Duration) -> bool;

    /// Opens a visible browser on `url` for a human solver and, once the
    /// interstitial is gone, moves its cookies into `session`
    ///
    /// Refuses (returns `false`) for headless sessions.
    async fn supervise_manual_resolution(
        &self,
        session: &Session,
        url: &str,
        timeout: Duration,
    ) -> bool;
}

/// Resolver driven by page-source signatures
pub struct SignatureResolver {
    signatures: Vec<String>,
    poll_interval: Duration,
    manual_poll_interval: Duration,
    sessions: Arc<SessionManager>,
}

impl SignatureResolver {
    pub fn new(
        signatures: Vec<String>,
        poll_interval: Duration,
        manual_poll_interval: Duration,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            signatures,
            poll_interval,
            manual_poll_interval,
            sessions,
        }
    }

    pub fn from_config(config: &ChallengeConfig, sessions: Arc<SessionManager>) -> Self {
        Self::new(
            config.signatures.clone(),
            config.poll_interval(),
            config.manual_poll_interval(),
            sessions,
        )
    }

    /// Polls `driver` until the signature is gone; `false` once `deadline`
    /// passes
    async fn poll_until_clear(
        &self,
        driver: &dyn BrowserDriver,
        interval: Duration,
        deadline: Instant,
    ) -> bool {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(interval.min(deadline - now)).await;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match tokio::time::timeout(remaining, driver.page_source()).await {
                Ok(Ok(html)) if !self.is_challenge_present(&html) => return true,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("Reading page source while polling failed: {}", e),
                Err(_) => return false,
            }
        }
    }

    /// Copies the solver's cookies into `session` and reloads its page
    async fn transfer_cookies(
        &self,
        from: &dyn BrowserDriver,
        session: &Session,
        url: &str,
    ) -> bool {
        let step = self.sessions.options().page_load_timeout;
        let driver = session.driver();

        let cookies = match tokio::time::timeout(step, from.cookies()).await {
            Ok(Ok(cookies)) => cookies,
            Ok(Err(e)) => {
                warn!("Could not read cookies from the solver browser: {}", e);
                return false;
            }
            Err(_) => {
                warn!("Reading cookies from the solver browser timed out");
                return false;
            }
        };

        // Cookies can only be set for the domain currently loaded
        if !matches!(tokio::time::timeout(step, driver.navigate(url)).await, Ok(Ok(()))) {
            warn!("Session {} could not reopen {} for cookie transfer", session.id(), url);
            return false;
        }
        if !matches!(
            tokio::time::timeout(step, driver.add_cookies(&cookies)).await,
            Ok(Ok(()))
        ) {
            warn!("Session {} rejected transferred cookies", session.id());
            return false;
        }
        if !matches!(tokio::time::timeout(step, driver.reload()).await, Ok(Ok(()))) {
            warn!("Session {} failed to reload after cookie transfer", session.id());
            return false;
        }

        info!(
            "Transferred {} cookies into session {}",
            cookies.len(),
            session.id()
        );
        true
    }
}

#[async_trait]
impl ChallengeResolver for SignatureResolver {
    fn is_challenge_present(&self, html: &str) -> bool {
        self.signatures.iter().any(|s| html.contains(s.as_str()))
    }

    async fn wait_for_auto_resolution(&self, session: &Session, timeout: Duration) -> bool {
        info!("Challenge detected, waiting up to {:?} for it to clear", timeout);
        let deadline = Instant::now() + timeout;
        let cleared = self
            .poll_until_clear(session.driver().as_ref(), self.poll_interval, deadline)
            .await;
        if cleared {
            info!("Challenge cleared on session {}", session.id());
        } else {
            warn!("Challenge did not clear within {:?}", timeout);
        }
        cleared
    }

    async fn supervise_manual_resolution(
        &self,
        session: &Session,
        url: &str,
        timeout: Duration,
    ) -> bool {
        if session.headless() {
            debug!("Manual challenge resolution is unavailable in headless mode");
            return false;
        }

        let solver = match self.sessions.launch_visible().await {
            Ok(driver) => driver,
            Err(e) => {
                warn!("Could not open a browser for manual challenge resolution: {}", e);
                return false;
            }
        };

        warn!(
            "Please solve the challenge for {} in the opened browser window (waiting {:?})",
            url, timeout
        );
        let deadline = Instant::now() + timeout;

        let resolved = match tokio::time::timeout(timeout, solver.navigate(url)).await {
            Ok(Ok(())) => {
                self.poll_until_clear(solver.as_ref(), self.manual_poll_interval, deadline)
                    .await
                    && self.transfer_cookies(solver.as_ref(), session, url).await
            }
            Ok(Err(e)) => {
                warn!("Solver browser failed to open {}: {}", url, e);
                false
            }
            Err(_) => {
                warn!("Solver browser timed out opening {}", url);
                false
            }
        };

        self.sessions.dispose_driver("solver browser", solver.as_ref()).await;

        if resolved {
            info!("Manual challenge resolution succeeded for {}", url);
        } else {
            warn!("Manual challenge resolution failed for {}", url);
        }
        resolved
    }
}

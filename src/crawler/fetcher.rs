//! Page fetching under a watchdog
//!
//! This module handles:
//! - Running one page load on a supervised task with a hard deadline
//! - Classifying each attempt into a `FetchOutcome`
//! - The per-target retry loop: backoff, session restarts, challenge handling
//!
//! # Retry Logic
//!
//! | Outcome | Action |
//! |---------|--------|
//! | Watchdog timeout | Restart session, retry |
//! | Read timeout / connection reset | Backoff sleep, retry on same session |
//! | Fatal driver error | Restart session, retry |
//! | Challenge | Auto wait, then manual (interactive only), else restart and retry |
//! | Success | Done |

use crate::browser::{BrowserDriver, DriverError, LoadedPage};
use crate::config::Config;
use crate::crawler::challenge::ChallengeResolver;
use crate::crawler::session::{Session, SessionManager};
use crate::state::TargetState;
use crate::LadleError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const ABORT_GRACE: Duration = Duration::from_millis(100);

/// Result of a single load attempt
#[derive(Debug)]
pub enum FetchOutcome {
    Success(LoadedPage),

    /// The watchdog fired; the load was abandoned
    Timeout,

    /// Read timeout or connection reset; the session is still usable
    TransientError(DriverError),

    /// The handle is broken and must be replaced
    FatalDriverError(DriverError),

    /// The page loaded but shows an anti-bot interstitial
    ChallengePending(LoadedPage),
}

/// Maps a driver failure onto the retry classes
pub fn classify_driver_error(error: DriverError) -> FetchOutcome {
    if error.is_transient() {
        FetchOutcome::TransientError(error)
    } else {
        FetchOutcome::FatalDriverError(error)
    }
}

/// Loads `url` once on a spawned task, abandoning it when `watchdog` expires
///
/// The driver call is never awaited past the deadline. An abandoned load keeps
/// the handle in an unknown state, so callers must replace the session.
pub async fn load_once(
    driver: Arc<dyn BrowserDriver>,
    url: &str,
    watchdog: Duration,
    resolver: &dyn ChallengeResolver,
) -> FetchOutcome {
    let requested = url.to_string();
    let mut handle = tokio::spawn(async move {
        driver.navigate(&requested).await?;
        let html = driver.page_source().await?;
        let final_url = driver
            .current_url()
            .await
            .unwrap_or_else(|_| requested.clone());
        Ok::<_, DriverError>(LoadedPage {
            url: requested,
            final_url,
            html,
        })
    });

    match tokio::time::timeout(watchdog, &mut handle).await {
        Ok(Ok(Ok(page))) => {
            if resolver.is_challenge_present(&page.html) {
                FetchOutcome::ChallengePending(page)
            } else {
                FetchOutcome::Success(page)
            }
        }
        Ok(Ok(Err(e))) => classify_driver_error(e),
        Ok(Err(join_error)) => FetchOutcome::FatalDriverError(DriverError::Fatal(format!(
            "load task failed: {}",
            join_error
        ))),
        Err(_) => {
            handle.abort();
            // Let the aborted task unwind before the session is torn down
            let _ = tokio::time::timeout(ABORT_GRACE, handle).await;
            FetchOutcome::Timeout
        }
    }
}

/// Retry budget and deadlines for one target
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub max_attempts: u32,
    pub watchdog: Duration,

    /// Sleep before retrying a transient error is `backoff_base * 2^attempt`
    pub backoff_base: Duration,

    pub auto_challenge_timeout: Duration,
    pub manual_challenge_timeout: Duration,
}

impl FetchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.crawler.max_attempts.max(1),
            watchdog: config.crawler.watchdog_timeout(),
            backoff_base: config.crawler.backoff_base(),
            auto_challenge_timeout: config.challenge.auto_timeout(),
            manual_challenge_timeout: config.challenge.manual_timeout(),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

/// Final result of fetching one target
#[derive(Debug)]
pub enum FetchReport {
    Fetched { page: LoadedPage, attempts: u32 },

    /// The attempt budget ran out
    GivenUp { attempts: u32 },
}

impl FetchReport {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fetched { attempts, .. } | Self::GivenUp { attempts } => *attempts,
        }
    }
}

/// Drives the retry/restart state machine for one target at a time
pub struct PageFetchController {
    sessions: Arc<SessionManager>,
    resolver: Arc<dyn ChallengeResolver>,
    policy: FetchPolicy,
}

impl PageFetchController {
    pub fn new(
        sessions: Arc<SessionManager>,
        resolver: Arc<dyn ChallengeResolver>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            sessions,
            resolver,
            policy,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetches `url` on `session`, replacing the session in place whenever it
    /// has to be restarted
    ///
    /// Exhausting the attempt budget is reported as `FetchReport::GivenUp`.
    /// An error is returned only when a replacement session cannot be built;
    /// `session` is unusable afterwards.
    pub async fn fetch(&self, session: &mut Session, url: &str) -> Result<FetchReport, LadleError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = TargetState::Pending;
        state.transition(TargetState::Attempting)?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Loading {} (attempt {}/{})", url, attempt, max_attempts);

            let outcome = load_once(
                Arc::clone(session.driver()),
                url,
                self.policy.watchdog,
                self.resolver.as_ref(),
            )
            .await;

            let restart = match outcome {
                FetchOutcome::Success(page) => {
                    state.transition(TargetState::Success)?;
                    return Ok(FetchReport::Fetched {
                        page,
                        attempts: attempt,
                    });
                }
                FetchOutcome::Timeout => {
                    warn!(
                        "Watchdog fired after {:?} loading {} (attempt {}/{})",
                        self.policy.watchdog, url, attempt, max_attempts
                    );
                    state.transition(TargetState::Retrying)?;
                    true
                }
                FetchOutcome::TransientError(e) => {
                    warn!(
                        "Transient error loading {} (attempt {}/{}): {}",
                        url, attempt, max_attempts, e
                    );
                    state.transition(TargetState::Retrying)?;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                    false
                }
                FetchOutcome::FatalDriverError(e) => {
                    warn!(
                        "Session {} failed loading {} (attempt {}/{}): {}",
                        session.id(),
                        url,
                        attempt,
                        max_attempts,
                        e
                    );
                    state.transition(TargetState::Retrying)?;
                    true
                }
                FetchOutcome::ChallengePending(_) => {
                    state.transition(TargetState::ChallengeHandling)?;
                    match self.resolve_challenge(session, url).await {
                        Some(page) => {
                            state.transition(TargetState::Success)?;
                            return Ok(FetchReport::Fetched {
                                page,
                                attempts: attempt,
                            });
                        }
                        None => {
                            state.transition(TargetState::Retrying)?;
                            true
                        }
                    }
                }
            };

            // A hung or broken handle is replaced even when the budget is spent,
            // so the worker's next target starts on a healthy session
            if restart {
                self.sessions
                    .renew(session)
                    .await
                    .map_err(|source| LadleError::SessionUnavailable {
                        session: session.id(),
                        source,
                    })?;
            }

            if attempt >= max_attempts {
                state.transition(TargetState::GivenUp)?;
                error!("Giving up on {} after {} attempts", url, attempt);
                return Ok(FetchReport::GivenUp { attempts: attempt });
            }
            state.transition(TargetState::Attempting)?;
        }
    }

    /// Waits for the interstitial to clear, falling back to manual solving in
    /// interactive sessions; returns the cleared page
    async fn resolve_challenge(&self, session: &Session, url: &str) -> Option<LoadedPage> {
        if self
            .resolver
            .wait_for_auto_resolution(session, self.policy.auto_challenge_timeout)
            .await
        {
            return self.read_current_page(session, url).await;
        }

        if session.headless() {
            info!("Challenge unresolved for {} in headless mode; restarting session", url);
            return None;
        }

        if self
            .resolver
            .supervise_manual_resolution(session, url, self.policy.manual_challenge_timeout)
            .await
        {
            return self.read_current_page(session, url).await;
        }
        None
    }

    /// Reads the session's current page, bounded by the watchdog
    async fn read_current_page(&self, session: &Session, url: &str) -> Option<LoadedPage> {
        let driver = session.driver();
        let read = async {
            let html = driver.page_source().await?;
            let final_url = driver.current_url().await.unwrap_or_else(|_| url.to_string());
            Ok::<_, DriverError>((html, final_url))
        };

        match tokio::time::timeout(self.policy.watchdog, read).await {
            Ok(Ok((html, final_url))) if !self.resolver.is_challenge_present(&html) => {
                Some(LoadedPage {
                    url: url.to_string(),
                    final_url,
                    html,
                })
            }
            Ok(Ok(_)) => {
                warn!("Challenge came back on {}", url);
                None
            }
            Ok(Err(e)) => {
                warn!("Reading {} after challenge resolution failed: {}", url, e);
                None
            }
            Err(_) => {
                warn!("Reading {} after challenge resolution timed out", url);
                None
            }
        }
    }
}

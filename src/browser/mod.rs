//! Browser-automation abstraction
//!
//! Defines the `BrowserDriver` and `DriverFactory` traits that the crawler
//! drives. Two backends exist: a plain HTTP driver (always available) and a
//! Chromium driver behind the `chrome` feature.

#[cfg(feature = "chrome")]
pub mod chrome;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "chrome")]
pub use chrome::ChromeDriverFactory;
pub use http::{HttpDriver, HttpDriverFactory};

/// Browser-layer failures, classified so callers can choose a recovery
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The network read timed out; the handle itself is still usable
    #[error("read timeout: {0}")]
    ReadTimeout(String),

    /// The connection was reset or refused; the handle itself is still usable
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// The handle is broken and must be replaced
    #[error("fatal driver error: {0}")]
    Fatal(String),

    /// Anything else the driver reported
    #[error("driver error: {0}")]
    Other(String),

    /// A new handle could not be constructed
    #[error("failed to launch browser: {0}")]
    Launch(String),
}

impl DriverError {
    /// Errors that are retried in place on the same session
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ReadTimeout(_) | Self::ConnectionReset(_))
    }
}

/// A browser cookie, as carried between sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
        }
    }
}

/// Construction parameters for one browser handle
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub width: u32,
    pub height: u32,

    /// The driver's own page-load timeout
    pub page_load_timeout: Duration,

    pub user_agent: String,
    pub chrome_path: Option<PathBuf>,
}

impl LaunchOptions {
    /// Options for the visible window opened for manual challenge solving
    pub fn visible(&self, width: u32, height: u32) -> Self {
        Self {
            headless: false,
            width,
            height,
            ..self.clone()
        }
    }
}

/// A page that finished loading
#[derive(Debug, Clone)]
pub struct LoadedPage {
    /// The URL that was requested
    pub url: String,
    /// The URL the browser ended up on
    pub final_url: String,
    pub html: String,
}

/// One exclusive browser-automation handle
///
/// Implementations must tolerate a call that never returns: the crawler
/// abandons hung calls and disposes the handle instead of waiting.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Load a URL and wait for the driver's notion of "loaded"
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Full HTML of the current page
    async fn page_source(&self) -> Result<String, DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError>;

    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<(), DriverError>;

    /// Reload the current page
    async fn reload(&self) -> Result<(), DriverError>;

    async fn clear_cookies(&self) -> Result<(), DriverError>;

    async fn close_windows(&self) -> Result<(), DriverError>;

    /// Terminate the handle; every later call fails
    async fn quit(&self) -> Result<(), DriverError>;
}

/// Constructs browser handles
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserDriver>, DriverError>;
}

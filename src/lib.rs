//! Ladle: a resilient parallel recipe crawler
//!
//! This crate turns a list of recipe and category URLs into fetched pages and
//! persisted records. A fixed pool of workers each owns one browser session,
//! survives hung loads, crashed sessions and anti-bot interstitials, and commits
//! one output file per target so an interrupted run can simply be started again.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Ladle operations
#[derive(Debug, Error)]
pub enum LadleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Browser driver error: {0}")]
    Driver(#[from] browser::DriverError),

    #[error("Session {session} could not be replaced: {source}")]
    SessionUnavailable {
        session: u64,
        source: browser::DriverError,
    },

    #[error("Extraction failed for {url}: {source}")]
    Extraction {
        url: String,
        source: extract::ExtractionError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::TargetState,
        to: state::TargetState,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Ladle operations
pub type Result<T> = std::result::Result<T, LadleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use output::{ResultsTally, RunSummary};
pub use state::{TargetState, WorkerState};
pub use url::{normalize_url, Target};

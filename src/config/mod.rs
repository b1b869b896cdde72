//! Configuration module for Ladle
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use ladle::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ladle.toml")).unwrap();
//! println!("Workers: {}", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, ChallengeConfig, Config, CrawlerConfig, DiscoveryConfig, DriverKind,
    OutputConfig, ResumeConfig, SiteConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;

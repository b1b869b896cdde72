use crate::config::types::{
    ChallengeConfig, Config, CrawlerConfig, DiscoveryConfig, OutputConfig, ResumeConfig,
    SiteConfig,
};
use crate::ConfigError;
use url::Url;

/// Upper bound on pool size; each worker owns a whole browser
const MAX_WORKERS: usize = 32;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_challenge_config(&config.challenge)?;
    validate_site_config(&config.site)?;
    validate_discovery_config(&config.discovery)?;
    validate_output_config(&config.output)?;
    validate_resume_config(&config.resume)?;
    Ok(())
}

/// Validates worker pool and retry settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    if config.watchdog_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "watchdog-timeout-ms must be > 0".to_string(),
        ));
    }

    // The driver's own timeout must never fire before the watchdog does
    if config.page_load_timeout_ms < config.watchdog_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "page-load-timeout-ms ({}) must be >= watchdog-timeout-ms ({})",
            config.page_load_timeout_ms, config.watchdog_timeout_ms
        )));
    }

    if config.politeness_min_ms > config.politeness_max_ms {
        return Err(ConfigError::Validation(format!(
            "politeness-min-ms ({}) must be <= politeness-max-ms ({})",
            config.politeness_min_ms, config.politeness_max_ms
        )));
    }

    if config.queue_idle_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "queue-idle-timeout-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_challenge_config(config: &ChallengeConfig) -> Result<(), ConfigError> {
    if config.signatures.iter().any(|s| s.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "challenge signatures cannot be empty strings".to_string(),
        ));
    }

    if config.poll_interval_ms == 0 || config.manual_poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "challenge poll intervals must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if base.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    if config.targets_file.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "targets-file cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    if config.max_page_number < 1 {
        return Err(ConfigError::Validation(
            "max-page-number must be >= 1".to_string(),
        ));
    }

    if config.max_empty_pages < 1 {
        return Err(ConfigError::Validation(
            "max-empty-pages must be >= 1".to_string(),
        ));
    }

    if config.max_path_segments < 3 {
        return Err(ConfigError::InvalidPattern(format!(
            "max-path-segments must be >= 3 to admit any absolute URL, got {}",
            config.max_path_segments
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output-dir cannot be empty".to_string(),
        ));
    }

    if config.records_subdir.is_empty()
        || config.records_subdir.contains('/')
        || config.records_subdir.contains('\\')
    {
        return Err(ConfigError::Validation(format!(
            "records-subdir must be a single directory name, got '{}'",
            config.records_subdir
        )));
    }

    if config.combined_file.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "combined-file cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_resume_config(config: &ResumeConfig) -> Result<(), ConfigError> {
    if let Some(url) = &config.from_url {
        Url::parse(url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid resume from-url: {}", e)))?;
    }

    if config.from_page == Some(0) {
        return Err(ConfigError::Validation(
            "resume from-page is 1-based".to_string(),
        ));
    }

    if config.from_page.is_some() && config.from_url.is_none() {
        return Err(ConfigError::Validation(
            "resume from-page requires from-url".to_string(),
        ));
    }

    Ok(())
}

//! Crawler module: sessions, fetching and the worker pool
//!
//! This module contains the core crawling logic, including:
//! - Browser session lifecycle (create, restart, dispose)
//! - Watchdog-bounded page loads with retry and challenge handling
//! - The shared target queue and worker pool
//! - The two crawl variants: recipe pages and paginated category discovery

mod challenge;
mod coordinator;
mod discovery;
mod fetcher;
mod parser;
mod politeness;
mod queue;
mod recipes;
mod session;

pub use challenge::{ChallengeResolver, SignatureResolver};
pub use coordinator::{prepare_work_set, Coordinator, PoolSettings, TargetJob, TaskOutcome};
pub use discovery::{
    harvest_category_links, page_url, shard_name, PaginationJob, PaginationSettings, LINKS_FILE,
};
pub use fetcher::{
    classify_driver_error, load_once, FetchOutcome, FetchPolicy, FetchReport, PageFetchController,
};
pub use parser::{extract_links, no_more_pages};
pub use politeness::PolitenessDelay;
pub use queue::{Dequeued, TargetQueue, WorkerRegistration};
pub use recipes::RecipeJob;
pub use session::{Session, SessionManager, SessionPolicy};

use crate::browser::{DriverFactory, HttpDriverFactory, LaunchOptions};
use crate::config::{Config, DriverKind};
use crate::extract::RecipeExtractor;
use crate::output::RunSummary;
use crate::storage::{
    combine_shards, filter_blacklist, load_blacklist, load_url_file, write_lines_atomic,
    FsResultStore, LinkFilter,
};
use crate::url::Target;
use crate::{ConfigError, LadleError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Builds the driver factory for the configured backend
pub fn build_driver_factory(config: &Config) -> Result<Arc<dyn DriverFactory>, ConfigError> {
    match config.browser.driver {
        DriverKind::Http => Ok(Arc::new(HttpDriverFactory)),
        #[cfg(feature = "chrome")]
        DriverKind::Chrome => Ok(Arc::new(crate::browser::ChromeDriverFactory)),
        #[cfg(not(feature = "chrome"))]
        DriverKind::Chrome => Err(ConfigError::Validation(
            "driver = \"chrome\" requires building with the `chrome` feature".to_string(),
        )),
    }
}

/// Launch options every session of this run is built with
pub fn launch_options(config: &Config) -> LaunchOptions {
    LaunchOptions {
        headless: config.crawler.headless,
        width: config.browser.window_width,
        height: config.browser.window_height,
        page_load_timeout: config.crawler.page_load_timeout(),
        user_agent: config.browser.user_agent.clone(),
        chrome_path: config.browser.chrome_path.clone(),
    }
}

/// Wires the session manager, challenge resolver and fetch controller
/// around `factory`
pub fn build_controller(config: &Config, factory: Arc<dyn DriverFactory>) -> Arc<PageFetchController> {
    let policy = SessionPolicy {
        launch_backoff: config.crawler.backoff_base(),
        restart_delay: config.crawler.restart_delay(),
        dispose_step_timeout: config.crawler.page_load_timeout().max(Duration::from_secs(1)),
    };
    let sessions = Arc::new(SessionManager::new(
        factory,
        launch_options(config),
        (
            config.browser.gui_window_width,
            config.browser.gui_window_height,
        ),
        policy,
    ));
    let resolver = Arc::new(SignatureResolver::from_config(
        &config.challenge,
        Arc::clone(&sessions),
    ));
    Arc::new(PageFetchController::new(
        sessions,
        resolver,
        FetchPolicy::from_config(config),
    ))
}

/// Reads a URL list into targets, dropping blacklisted and malformed entries
pub fn load_targets(path: &Path, config: &Config) -> Result<Vec<Target>, LadleError> {
    let blacklist = load_blacklist(config.site.blacklist_file.as_deref())?;
    let lines = load_url_file(path)?;
    let total = lines.len();

    let mut targets = Vec::with_capacity(total);
    for line in filter_blacklist(lines, &blacklist) {
        match Target::parse(&line) {
            Ok(target) => targets.push(target),
            Err(e) => tracing::warn!("Ignoring target {}: {}", line, e),
        }
    }
    tracing::info!(
        "Loaded {} targets from {} ({} blacklisted or invalid)",
        targets.len(),
        path.display(),
        total - targets.len()
    );
    Ok(targets)
}

fn resume_target(config: &Config) -> Result<Option<Target>, LadleError> {
    Ok(config
        .resume
        .from_url
        .as_deref()
        .map(Target::parse)
        .transpose()?)
}

/// Crawls recipe pages and commits one JSON record per target
pub async fn crawl_recipes(
    config: &Config,
    factory: Arc<dyn DriverFactory>,
    targets: Vec<Target>,
) -> Result<RunSummary, LadleError> {
    let extractor = RecipeExtractor::new(&config.site.ready_selector, &config.site.required_marker)
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let store = FsResultStore::new(config.output.records_dir(), "json");
    let job = RecipeJob::new(
        Arc::new(store),
        Arc::new(extractor),
        config.site.base_url.clone(),
        config.crawler.skip_existing,
    );

    Coordinator::new(
        build_controller(config, factory),
        Arc::new(job),
        PoolSettings::from_config(config),
    )
    .resume_from(resume_target(config)?)
    .write_summary_to(&config.output.output_dir)
    .run(targets)
    .await
}

/// Walks every category target page by page and shards the links found
pub async fn discover_links(
    config: &Config,
    factory: Arc<dyn DriverFactory>,
    targets: Vec<Target>,
) -> Result<RunSummary, LadleError> {
    let resume = resume_target(config)?;
    let mut job = PaginationJob::new(
        &config.output.output_dir,
        PaginationSettings::from_config(config),
        PolitenessDelay::from_millis(
            config.crawler.politeness_min_ms,
            config.crawler.politeness_max_ms,
        ),
    );
    if let (Some(target), Some(page)) = (&resume, config.resume.from_page) {
        job = job.resume_at(target.clone(), page);
    }

    Coordinator::new(
        build_controller(config, factory),
        Arc::new(job),
        PoolSettings::from_config(config),
    )
    .resume_from(resume)
    .write_summary_to(&config.output.output_dir)
    .run(targets)
    .await
}

/// Harvests the category links of one index page into `targets-file`
pub async fn harvest_categories(
    config: &Config,
    factory: Arc<dyn DriverFactory>,
    index_url: &str,
) -> Result<usize, LadleError> {
    let index = Target::parse(index_url)?;
    let blacklist = load_blacklist(config.site.blacklist_file.as_deref())?;
    let controller = build_controller(config, factory);

    let mut session = controller.sessions().create(config.crawler.headless).await?;
    let result = harvest_category_links(
        &controller,
        &mut session,
        &index,
        &blacklist,
        &config.site.targets_file,
    )
    .await;
    controller.sessions().dispose(&session).await;
    result
}

/// Merges every link shard under the output directory into `combined-file`
pub fn combine_targets(config: &Config) -> Result<usize, LadleError> {
    let filter = LinkFilter {
        base_url: config.site.base_url.clone(),
        max_path_segments: config.discovery.max_path_segments,
        exclude_substrings: config.discovery.exclude_substrings.clone(),
    };
    let blacklist = load_blacklist(config.site.blacklist_file.as_deref())?;

    let combined = combine_shards(&config.output.output_dir, &filter)?;
    let links = filter_blacklist(combined, &blacklist);
    write_lines_atomic(&config.output.combined_file, &links)?;
    tracing::info!(
        "Combined {} links into {}",
        links.len(),
        config.output.combined_file.display()
    );
    Ok(links.len())
}

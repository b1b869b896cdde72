use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Ladle
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub challenge: ChallengeConfig,
    pub site: SiteConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub resume: ResumeConfig,
}

/// Worker pool, retry and politeness settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Number of concurrent workers, each owning one browser session
    pub workers: usize,

    /// Load attempts per target before it is given up
    pub max_attempts: u32,

    /// Hard deadline for one page load, enforced by the controller
    pub watchdog_timeout_ms: u64,

    /// Page-load timeout handed to the driver itself
    pub page_load_timeout_ms: u64,

    /// How long a worker waits on an empty queue before exiting
    pub queue_idle_timeout_ms: u64,

    /// Upper bound for joining each worker at shutdown
    pub join_timeout_ms: u64,

    /// Lower bound of the randomized pause between fetches
    pub politeness_min_ms: u64,

    /// Upper bound of the randomized pause between fetches
    pub politeness_max_ms: u64,

    /// Base of the exponential backoff (sleep = base * 2^attempt)
    pub backoff_base_ms: u64,

    /// Quiescence delay before a replacement session is created
    pub restart_delay_ms: u64,

    /// Skip targets and pages whose output already exists
    pub skip_existing: bool,

    /// Run browser sessions without a visible window
    pub headless: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            max_attempts: 3,
            watchdog_timeout_ms: 7_000,
            page_load_timeout_ms: 7_000,
            queue_idle_timeout_ms: 60_000,
            join_timeout_ms: 30_000,
            politeness_min_ms: 500,
            politeness_max_ms: 1_500,
            backoff_base_ms: 1_000,
            restart_delay_ms: 1_500,
            skip_existing: true,
            headless: false,
        }
    }
}

impl CrawlerConfig {
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn queue_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_idle_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Which browser-automation backend to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Plain HTTP page loads without script execution
    Http,
    /// Chromium over the DevTools protocol (requires the `chrome` feature)
    Chrome,
}

/// Browser session construction settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BrowserConfig {
    pub driver: DriverKind,
    pub window_width: u32,
    pub window_height: u32,

    /// Window size of the visible browser opened for manual challenge solving
    pub gui_window_width: u32,
    pub gui_window_height: u32,

    pub user_agent: String,
    pub chrome_path: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Http,
            window_width: 1024,
            window_height: 768,
            gui_window_width: 1200,
            gui_window_height: 900,
            user_agent: format!("ladle/{}", env!("CARGO_PKG_VERSION")),
            chrome_path: None,
        }
    }
}

/// Anti-bot interstitial detection and resolution settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ChallengeConfig {
    /// Page-source fragments that identify an interstitial
    pub signatures: Vec<String>,
    pub auto_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub manual_timeout_ms: u64,
    pub manual_poll_interval_ms: u64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            signatures: vec![
                "Just a moment...".to_string(),
                "Checking if the site connection is secure".to_string(),
            ],
            auto_timeout_ms: 30_000,
            poll_interval_ms: 1_000,
            manual_timeout_ms: 600_000,
            manual_poll_interval_ms: 2_000,
        }
    }
}

impl ChallengeConfig {
    pub fn auto_timeout(&self) -> Duration {
        Duration::from_millis(self.auto_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn manual_timeout(&self) -> Duration {
        Duration::from_millis(self.manual_timeout_ms)
    }

    pub fn manual_poll_interval(&self) -> Duration {
        Duration::from_millis(self.manual_poll_interval_ms)
    }
}

/// The crawled site and its input lists
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Root URL of the site; target output names are derived relative to it
    pub base_url: String,

    /// One URL per line: recipe pages, or category pages in discovery mode
    pub targets_file: PathBuf,

    /// URLs that must never be crawled
    #[serde(default)]
    pub blacklist_file: Option<PathBuf>,

    /// Text that marks a page as a recipe worth extracting
    #[serde(default = "default_required_marker")]
    pub required_marker: String,

    /// Selector that must be present once the recipe content has rendered
    #[serde(default = "default_ready_selector")]
    pub ready_selector: String,
}

fn default_required_marker() -> String {
    "Cook Mode".to_string()
}

fn default_ready_selector() -> String {
    ".wprm-recipe-summary".to_string()
}

/// Paginated category crawl settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DiscoveryConfig {
    /// Safety limit for pagination
    pub max_page_number: u32,

    /// Consecutive pages without links before a category is considered done
    pub max_empty_pages: u32,

    /// Page text shown past the last page of a category
    pub no_more_marker: String,

    /// Combined links with more `/`-separated parts than this are dropped
    pub max_path_segments: usize,

    /// Combined links containing any of these are dropped
    pub exclude_substrings: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_page_number: 2_000,
            max_empty_pages: 3,
            no_more_marker: "Nothing Found".to_string(),
            max_path_segments: 5,
            exclude_substrings: vec![
                "weekly-meal-".to_string(),
                "-recipes".to_string(),
                "#".to_string(),
            ],
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Root directory for records, link shards and the run summary
    pub output_dir: PathBuf,

    /// Subdirectory of `output_dir` holding one JSON record per recipe
    #[serde(default = "default_records_subdir")]
    pub records_subdir: String,

    /// Deduplicated, filtered union of all link shards
    pub combined_file: PathBuf,
}

fn default_records_subdir() -> String {
    "foods".to_string()
}

impl OutputConfig {
    pub fn records_dir(&self) -> PathBuf {
        self.output_dir.join(&self.records_subdir)
    }
}

/// Deterministic restart point
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResumeConfig {
    /// Skip every target ordered before this one
    pub from_url: Option<String>,

    /// First page to crawl for `from_url` in discovery mode
    pub from_page: Option<u32>,
}

//! Ladle main entry point
//!
//! This is the command-line interface for the Ladle recipe crawler.

use anyhow::Context;
use clap::Parser;
use ladle::config::{load_config_with_hash, validate, Config};
use ladle::crawler::{
    build_driver_factory, combine_targets, crawl_recipes, discover_links, harvest_categories,
    load_targets,
};
use ladle::RunSummary;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Ladle: a resilient parallel recipe crawler
///
/// Ladle fetches recipe and category pages with a pool of browser sessions,
/// rides out hung loads, crashed sessions and anti-bot interstitials, and
/// writes one output file per target so interrupted runs resume where they
/// stopped.
#[derive(Parser, Debug)]
#[command(name = "ladle")]
#[command(version)]
#[command(about = "A resilient parallel recipe crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Run browser sessions without a visible window
    #[arg(long)]
    headless: bool,

    /// Number of concurrent workers
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Skip every target ordered before this URL
    #[arg(long, value_name = "URL")]
    resume_from: Option<String>,

    /// First page to crawl for the resume target (with --discover)
    #[arg(long, value_name = "N", requires = "resume_from")]
    resume_page: Option<u32>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["discover", "combine", "categories"])]
    dry_run: bool,

    /// Crawl category pages page by page and collect their links
    #[arg(long, conflicts_with_all = ["dry_run", "combine", "categories"])]
    discover: bool,

    /// Merge collected link shards into the combined file and exit
    #[arg(long, conflicts_with_all = ["dry_run", "discover", "categories"])]
    combine: bool,

    /// Harvest category links from one index page into the targets file
    #[arg(long, value_name = "URL", conflicts_with_all = ["dry_run", "discover", "combine"])]
    categories: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli);
    validate(&config).context("invalid command-line overrides")?;

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.combine {
        let count = combine_targets(&config)?;
        println!(
            "Combined {} links into {}",
            count,
            config.output.combined_file.display()
        );
        Ok(())
    } else if let Some(index) = &cli.categories {
        let factory = build_driver_factory(&config)?;
        let count = harvest_categories(&config, factory, index).await?;
        println!(
            "Harvested {} category links into {}",
            count,
            config.site.targets_file.display()
        );
        Ok(())
    } else if cli.discover {
        let factory = build_driver_factory(&config)?;
        let targets = load_targets(&config.site.targets_file, &config)
            .with_context(|| format!("reading {}", config.site.targets_file.display()))?;
        let summary = discover_links(&config, factory, targets).await?;
        report(&summary);
        Ok(())
    } else {
        handle_crawl(&config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ladle=info,warn"),
            1 => EnvFilter::new("ladle=debug,info"),
            2 => EnvFilter::new("ladle=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command-line flags on top of the file configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if cli.headless {
        config.crawler.headless = true;
    }
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if let Some(url) = &cli.resume_from {
        config.resume.from_url = Some(url.clone());
    }
    if let Some(page) = cli.resume_page {
        config.resume.from_page = Some(page);
    }
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Ladle Dry Run ===\n");

    println!("Crawler:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!("  Watchdog timeout: {}ms", config.crawler.watchdog_timeout_ms);
    println!(
        "  Politeness delay: {}-{}ms",
        config.crawler.politeness_min_ms, config.crawler.politeness_max_ms
    );
    println!("  Headless: {}", config.crawler.headless);
    println!("  Driver: {:?}", config.browser.driver);

    println!("\nSite:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Targets file: {}", config.site.targets_file.display());

    println!("\nOutput:");
    println!("  Records: {}", config.output.records_dir().display());
    println!("  Combined links: {}", config.output.combined_file.display());

    if let Some(url) = &config.resume.from_url {
        match config.resume.from_page {
            Some(page) => println!("\nResuming from: {} (page {})", url, page),
            None => println!("\nResuming from: {}", url),
        }
    }

    let source = if config.site.targets_file.exists() {
        &config.site.targets_file
    } else {
        &config.output.combined_file
    };
    if source.exists() {
        let targets = load_targets(source, config)?;
        println!("\n✓ Configuration is valid");
        println!("✓ Would crawl {} targets from {}", targets.len(), source.display());
    } else {
        println!("\n✓ Configuration is valid");
        println!("! No target list found yet; run --discover and --combine first");
    }

    Ok(())
}

/// Handles the default mode: crawl recipe pages
async fn handle_crawl(config: &Config) -> anyhow::Result<()> {
    let source = if config.site.targets_file.exists() {
        config.site.targets_file.clone()
    } else {
        tracing::info!(
            "{} not found, combining collected links first",
            config.site.targets_file.display()
        );
        combine_targets(config).context("combining link shards")?;
        config.output.combined_file.clone()
    };

    let targets = load_targets(&source, config)
        .with_context(|| format!("reading {}", source.display()))?;
    let factory = build_driver_factory(config)?;

    match crawl_recipes(config, factory, targets).await {
        Ok(summary) => {
            report(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

fn report(summary: &RunSummary) {
    println!(
        "Success: {}  Failed: {}  Skipped: {}  Unprocessed: {}",
        summary.success, summary.failed, summary.skipped, summary.unprocessed
    );
}

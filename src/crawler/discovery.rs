//! Link discovery: paginated category crawls and single-page harvests
//!
//! A category target `https://site.com/category/dinner/` is walked page by
//! page (`.../page/2/`, `.../page/3/`, ...). Each page's links land in their
//! own shard file so an interrupted walk resumes at the first missing page.

use crate::config::Config;
use crate::crawler::coordinator::{TargetJob, TaskOutcome};
use crate::crawler::fetcher::{FetchReport, PageFetchController};
use crate::crawler::parser::{extract_links, no_more_pages};
use crate::crawler::politeness::PolitenessDelay;
use crate::crawler::session::Session;
use crate::storage::{filter_blacklist, load_url_file, write_lines_atomic, StorageError};
use crate::url::{site_slug, Target};
use crate::LadleError;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// Union of every shard of a finished category
pub const LINKS_FILE: &str = "links.txt";

/// Shard file holding the links found on page `page`
pub fn shard_name(page: u32) -> String {
    format!("file{}.txt", page)
}

/// URL of page `page` of a category target
pub fn page_url(target: &Target, page: u32) -> String {
    let base = target.as_str();
    if base.ends_with('/') {
        format!("{}page/{}/", base, page)
    } else {
        format!("{}/page/{}/", base, page)
    }
}

/// Pagination limits
#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub max_page_number: u32,
    pub max_empty_pages: u32,
    pub no_more_marker: String,
    pub skip_existing: bool,
}

impl PaginationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_page_number: config.discovery.max_page_number,
            max_empty_pages: config.discovery.max_empty_pages.max(1),
            no_more_marker: config.discovery.no_more_marker.clone(),
            skip_existing: config.crawler.skip_existing,
        }
    }
}

/// Walks the pages of one category target and shards its links
pub struct PaginationJob {
    output_dir: PathBuf,
    settings: PaginationSettings,
    politeness: PolitenessDelay,

    /// Resume point: the target and the page to start it at
    resume: Option<(Target, u32)>,
}

impl PaginationJob {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        settings: PaginationSettings,
        politeness: PolitenessDelay,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            settings,
            politeness,
            resume: None,
        }
    }

    /// Starts `target` at `page` instead of page 1; other targets are unaffected
    pub fn resume_at(mut self, target: Target, page: u32) -> Self {
        self.resume = Some((target, page.max(1)));
        self
    }

    /// Directory holding the shards of `target`
    pub fn dir_for(&self, target: &Target) -> PathBuf {
        self.output_dir.join(site_slug(target.as_str()))
    }

    fn start_page(&self, target: &Target) -> u32 {
        match &self.resume {
            Some((resume, page)) if resume == target => *page,
            _ => 1,
        }
    }

    /// Unions the shards in `dir` into `links.txt`
    ///
    /// Nothing is written when no shard holds a link, so the category is
    /// not marked complete.
    fn write_union(&self, dir: &Path) -> Result<usize, StorageError> {
        let mut union = BTreeSet::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_shard = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("file") && n.ends_with(".txt"))
                .unwrap_or(false);
            if is_shard {
                union.extend(load_url_file(&path)?);
            }
        }
        if !union.is_empty() {
            write_lines_atomic(&dir.join(LINKS_FILE), &union)?;
        }
        Ok(union.len())
    }
}

#[async_trait]
impl TargetJob for PaginationJob {
    fn is_complete(&self, target: &Target) -> bool {
        self.settings.skip_existing && self.dir_for(target).join(LINKS_FILE).exists()
    }

    async fn run(
        &self,
        controller: &PageFetchController,
        session: &mut Session,
        target: &Target,
    ) -> Result<TaskOutcome, LadleError> {
        if self.is_complete(target) {
            info!("Skipping {}, links already collected", target);
            return Ok(TaskOutcome::Skipped);
        }

        let dir = self.dir_for(target);
        std::fs::create_dir_all(&dir)?;
        let domain = target.domain().unwrap_or_default();
        let mut empty_pages = 0;
        let mut fetched_any = false;

        for page in self.start_page(target)..=self.settings.max_page_number {
            let shard = dir.join(shard_name(page));
            if self.settings.skip_existing && shard.exists() {
                debug!("Page {} of {} already collected", page, target);
                continue;
            }

            let url = page_url(target, page);
            let loaded = match controller.fetch(session, &url).await? {
                FetchReport::Fetched { page: loaded, .. } => loaded,
                FetchReport::GivenUp { .. } => {
                    warn!("Stopping {} at page {}: page could not be loaded", target, page);
                    return Ok(TaskOutcome::Failed);
                }
            };
            fetched_any = true;

            if no_more_pages(&loaded.html, &self.settings.no_more_marker) {
                info!("{} has no page {}", target, page);
                break;
            }

            let base = Url::parse(&loaded.final_url).unwrap_or_else(|_| target.url().clone());
            let (_, links) = extract_links(&loaded.html, &base, &domain);
            if links.is_empty() {
                empty_pages += 1;
                debug!(
                    "No links on page {} of {} ({}/{})",
                    page, target, empty_pages, self.settings.max_empty_pages
                );
                if empty_pages >= self.settings.max_empty_pages {
                    info!("{} ran out of links at page {}", target, page);
                    break;
                }
            } else {
                empty_pages = 0;
                write_lines_atomic(&shard, &links)?;
                debug!("Saved {} links from page {} of {}", links.len(), page, target);
            }

            self.politeness.pause().await;
        }

        let total = self.write_union(&dir)?;
        if total == 0 {
            warn!("No links collected for {}; it will be retried on the next run", target);
            return Ok(TaskOutcome::Failed);
        }
        info!(
            "Collected {} links for {}{}",
            total,
            target,
            if fetched_any { "" } else { " (all pages cached)" }
        );
        Ok(TaskOutcome::Success)
    }
}

/// Harvests the links of one category index page into the targets file
///
/// Only on-site links survive, minus the blacklist. Returns how many were
/// written.
pub async fn harvest_category_links(
    controller: &PageFetchController,
    session: &mut Session,
    index: &Target,
    blacklist: &HashSet<String>,
    destination: &Path,
) -> Result<usize, LadleError> {
    let page = match controller.fetch(session, index.as_str()).await? {
        FetchReport::Fetched { page, .. } => page,
        FetchReport::GivenUp { attempts } => {
            return Err(LadleError::Driver(crate::browser::DriverError::Other(format!(
                "could not load {} after {} attempts",
                index, attempts
            ))))
        }
    };

    let domain = index.domain().unwrap_or_default();
    let (internal, _) = extract_links(&page.html, index.url(), &domain);
    let links = filter_blacklist(internal, blacklist);
    write_lines_atomic(destination, &links)?;
    info!(
        "Harvested {} category links from {} into {}",
        links.len(),
        index,
        destination.display()
    );
    Ok(links.len())
}

//! Recipe page crawl: fetch, extract, commit one JSON record per target

use crate::crawler::coordinator::{TargetJob, TaskOutcome};
use crate::crawler::fetcher::{FetchReport, PageFetchController};
use crate::crawler::session::Session;
use crate::extract::PageExtractor;
use crate::storage::ResultStore;
use crate::url::{target_slug, Target};
use crate::LadleError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RecipeJob {
    store: Arc<dyn ResultStore>,
    extractor: Arc<dyn PageExtractor>,
    base_url: String,
    skip_existing: bool,
}

impl RecipeJob {
    pub fn new(
        store: Arc<dyn ResultStore>,
        extractor: Arc<dyn PageExtractor>,
        base_url: impl Into<String>,
        skip_existing: bool,
    ) -> Self {
        Self {
            store,
            extractor,
            base_url: base_url.into(),
            skip_existing,
        }
    }

    /// Store key for a target, derived from its path below the base URL
    pub fn key_for(&self, target: &Target) -> String {
        target_slug(target.as_str(), &self.base_url)
    }
}

#[async_trait]
impl TargetJob for RecipeJob {
    fn is_complete(&self, target: &Target) -> bool {
        self.skip_existing && self.store.contains(&self.key_for(target))
    }

    async fn run(
        &self,
        controller: &PageFetchController,
        session: &mut Session,
        target: &Target,
    ) -> Result<TaskOutcome, LadleError> {
        let key = self.key_for(target);
        if self.skip_existing && self.store.contains(&key) {
            info!("Skipping {}, record already exists", target);
            return Ok(TaskOutcome::Skipped);
        }

        let page = match controller.fetch(session, target.as_str()).await? {
            FetchReport::Fetched { page, .. } => page,
            FetchReport::GivenUp { .. } => return Ok(TaskOutcome::Failed),
        };

        let record = match self.extractor.extract(&page) {
            Ok(record) => record,
            Err(source) => {
                let error = LadleError::Extraction {
                    url: target.to_string(),
                    source,
                };
                warn!("{}", error);
                return Ok(TaskOutcome::ExtractionFailed);
            }
        };

        let bytes = serde_json::to_vec_pretty(&record)?;
        self.store.commit(&key, &bytes)?;
        info!("Saved {}", key);
        Ok(TaskOutcome::Success)
    }
}

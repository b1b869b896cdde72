//! Recipe extraction from loaded pages
//!
//! The crawler only ever hands successfully fetched pages to a
//! `PageExtractor`. Extraction failures are counted, never retried.

mod recipe;

pub use recipe::RecipeExtractor;

use crate::browser::LoadedPage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a loaded page produced no record
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The page is not a recipe (missing marker or recipe card)
    #[error("not a recipe page: {0}")]
    NotARecipe(String),

    /// A configured selector does not parse
    #[error("invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
}

/// One extracted recipe, persisted as pretty JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRecord {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Summary")]
    pub summary: String,
    #[serde(rename = "Metadata")]
    pub metadata: Vec<String>,
    #[serde(rename = "Ingredients")]
    pub ingredients: Vec<String>,
    #[serde(rename = "Instructions")]
    pub instructions: Vec<String>,
    #[serde(rename = "Nutrition")]
    pub nutrition: Vec<String>,
    #[serde(rename = "Comments")]
    pub comments: Vec<String>,
    #[serde(rename = "CrawledAt")]
    pub crawled_at: DateTime<Utc>,
}

/// Turns a loaded page into a record
pub trait PageExtractor: Send + Sync {
    fn extract(&self, page: &LoadedPage) -> Result<RecipeRecord, ExtractionError>;
}

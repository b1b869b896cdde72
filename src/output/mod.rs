//! Output module for run reporting
//!
//! This module handles:
//! - Counting target outcomes across workers
//! - Logging the end-of-run summary
//! - Persisting the summary next to the crawl output

pub mod stats;

pub use stats::{log_summary, ResultsTally, RunSummary, TallyCounts};

use crate::storage::{write_atomic, StorageResult};
use std::path::{Path, PathBuf};

/// File name of the persisted run summary
pub const SUMMARY_FILE: &str = "run-summary.json";

/// Writes `summary` as pretty JSON into `dir`, atomically
pub fn write_run_summary(dir: &Path, summary: &RunSummary) -> StorageResult<PathBuf> {
    let path = dir.join(SUMMARY_FILE);
    let bytes = serde_json::to_vec_pretty(summary)?;
    write_atomic(&path, &bytes)?;
    Ok(path)
}

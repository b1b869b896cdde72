//! Resume/dedup store and file persistence
//!
//! This module handles everything the crawler writes to disk:
//! - Committed per-target records (`ResultStore`, `FsResultStore`)
//! - Atomic temp-file-then-rename writes
//! - URL list loading, link shard combination and blacklist filtering

mod files;
mod fs;
mod traits;

pub use files::{
    combine_shards, filter_blacklist, load_url_file, write_atomic, write_atomic_with,
    write_lines_atomic, LinkFilter,
};
pub use fs::FsResultStore;
pub use traits::{ResultStore, StorageError, StorageResult};

use std::collections::HashSet;
use std::path::Path;

/// Loads the blacklist, or an empty set when none is configured
pub fn load_blacklist(path: Option<&Path>) -> std::io::Result<HashSet<String>> {
    match path {
        Some(path) if path.exists() => Ok(load_url_file(path)?.into_iter().collect()),
        _ => Ok(HashSet::new()),
    }
}

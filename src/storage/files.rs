//! Atomic file writes and URL list handling

use crate::storage::{StorageError, StorageResult};
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Writes `path` through a temporary sibling file and a single rename
///
/// `fill` receives the temporary file. If it fails, or anything else fails
/// before the rename, the temporary file is removed and `path` is left as it
/// was.
pub fn write_atomic_with<F>(path: &Path, fill: F) -> StorageResult<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp_file = NamedTempFile::new_in(parent)?;
    fill(temp_file.as_file_mut())?;
    temp_file.as_file_mut().sync_all()?;

    temp_file.persist(path).map_err(|e| StorageError::Persist {
        path: path.display().to_string(),
        source: e.error,
    })?;
    debug!("Committed {}", path.display());
    Ok(())
}

/// Atomically replaces `path` with `bytes`
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    write_atomic_with(path, |file| file.write_all(bytes))
}

/// Atomically replaces `path` with one line per item
pub fn write_lines_atomic<I, S>(path: &Path, lines: I) -> StorageResult<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    write_atomic_with(path, |file| {
        let mut writer = BufWriter::new(file);
        for line in lines {
            writeln!(writer, "{}", line.as_ref())?;
        }
        writer.flush()
    })
}

/// Reads a URL list: one URL per line, blank lines and `#` comments ignored
pub fn load_url_file(path: &Path) -> io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Decides which harvested links make it into the combined target list
#[derive(Debug, Clone)]
pub struct LinkFilter {
    /// Links must start with this prefix
    pub base_url: String,

    /// Links with more `/`-separated parts are category or archive pages
    pub max_path_segments: usize,

    pub exclude_substrings: Vec<String>,
}

impl LinkFilter {
    pub fn accepts(&self, link: &str) -> bool {
        link.starts_with(&self.base_url)
            && link.split('/').count() <= self.max_path_segments
            && !self
                .exclude_substrings
                .iter()
                .any(|needle| link.contains(needle.as_str()))
    }
}

/// Unions every `file*.txt` shard below `source_dir` into one filtered set
pub fn combine_shards(source_dir: &Path, filter: &LinkFilter) -> StorageResult<BTreeSet<String>> {
    let mut combined = BTreeSet::new();
    let mut shards = 0usize;
    collect_shards(source_dir, filter, &mut combined, &mut shards)?;
    debug!(
        "Combined {} shards from {} into {} links",
        shards,
        source_dir.display(),
        combined.len()
    );
    Ok(combined)
}

fn collect_shards(
    dir: &Path,
    filter: &LinkFilter,
    combined: &mut BTreeSet<String>,
    shards: &mut usize,
) -> StorageResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_shards(&path, filter, combined, shards)?;
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with("file") && name.ends_with(".txt")) {
            continue;
        }

        match load_url_file(&path) {
            Ok(links) => {
                *shards += 1;
                combined.extend(links.into_iter().filter(|l| filter.accepts(l)));
            }
            Err(e) => warn!("Skipping unreadable shard {}: {}", path.display(), e),
        }
    }
    Ok(())
}

/// Drops every link that appears in the blacklist
pub fn filter_blacklist<I>(links: I, blacklist: &HashSet<String>) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    links
        .into_iter()
        .filter(|link| !blacklist.contains(link))
        .collect()
}

use crate::storage::files::write_atomic;
use crate::storage::{ResultStore, StorageResult};
use std::path::{Path, PathBuf};

/// One file per key under a directory
#[derive(Debug, Clone)]
pub struct FsResultStore {
    dir: PathBuf,
    extension: String,
}

impl FsResultStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final location of the output for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, self.extension))
    }
}

impl ResultStore for FsResultStore {
    fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn commit(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        write_atomic(&self.path_for(key), bytes)
    }
}

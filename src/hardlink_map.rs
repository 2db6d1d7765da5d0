// src/hardlink_map.rs

//! C8: Hard-link Map.
//!
//! Preserves hard-link topology across a copy: the first time a given
//! source inode is copied within one promise evaluation, record the
//! destination path it landed at; every subsequent promiser that resolves
//! to the same source inode is hard-linked to that destination instead of
//! copied again.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InodeKey {
    dev: u64,
    ino: u64,
}

/// Maps a source inode to the first destination path it was deployed to.
#[derive(Default)]
pub struct HardlinkMap {
    inner: Mutex<HashMap<InodeKey, PathBuf>>,
}

impl HardlinkMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(path: &Path) -> std::io::Result<InodeKey> {
        let meta = fs::metadata(path)?;
        Ok(InodeKey { dev: meta.dev(), ino: meta.ino() })
    }

    /// If `source`'s inode has already been deployed this run, return the
    /// destination it was deployed to. Otherwise register `dest` as the
    /// canonical destination for this inode and return `None`.
    pub fn register_or_lookup(&self, source: &Path, dest: &Path) -> std::io::Result<Option<PathBuf>> {
        let key = Self::key_of(source)?;
        let mut map = self.inner.lock().expect("HardlinkMap mutex poisoned");
        if let Some(existing) = map.get(&key) {
            return Ok(Some(existing.clone()));
        }
        map.insert(key, dest.to_path_buf());
        Ok(None)
    }

    /// Hard-link `dest` to `existing`, the canonical destination recorded
    /// for this source inode.
    pub fn link(existing: &Path, dest: &Path) -> std::io::Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if dest.exists() {
            fs::remove_file(dest)?;
        }
        fs::hard_link(existing, dest)
    }
}

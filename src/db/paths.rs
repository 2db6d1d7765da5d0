// src/db/paths.rs

//! Centralized path derivation for this engine's persistent stores.

use std::path::{Path, PathBuf};

/// Directory containing a database file.
pub fn db_dir(db_path: &str) -> PathBuf {
    Path::new(db_path).parent().unwrap_or(Path::new("/var/lib/convergefs")).to_path_buf()
}

/// Default location of the hash database relative to a base state
/// directory.
pub fn hashdb_path(state_dir: &str) -> PathBuf {
    Path::new(state_dir).join("hashdb.sqlite")
}

/// Default location of the stats database relative to a base state
/// directory.
pub fn statsdb_path(state_dir: &str) -> PathBuf {
    Path::new(state_dir).join("statsdb.sqlite")
}

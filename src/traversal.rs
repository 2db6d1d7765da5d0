// src/traversal.rs

//! C6: Traversal Engine.
//!
//! Walks a promise's `depth_search` tree and dispatches each entry back to
//! [`crate::dispatcher`]. The defense against a symlink-swap race during
//! descent is implemented by comparing directory identity (dev+ino) before
//! and after listing a directory, rather than `chdir`-ing into it: we never
//! mutate the process's current working directory, so a race on one
//! traversal can't corrupt another thread's notion of cwd.
//!
//! The symlink ownership check on `traverse_links` additionally accepts a
//! link owned by the effective uid of the running process, not only uid 0.

use crate::error::{Error, Result};
use crate::pathutil::DirIdentity;
use crate::promise::DepthSearch;
use nix::unistd::Uid;
use regex::Regex;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hard ceiling on recursion depth, independent of whatever
/// `depth_search.max_depth` a promise requests: no promise may force the
/// traversal deeper than this, to bound stack usage against pathological or
/// maliciously deep directory trees.
pub const RECURSION_LIMIT: u32 = 100;

/// A single filesystem entry discovered during traversal, already filtered
/// by include/exclude and depth limits.
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: PathBuf,
    pub depth: u32,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Walk `root` according to `search`, invoking `visit` for every entry that
/// survives the include/exclude filters. Aborts the whole walk with
/// [`Error::RecursionLimitExceeded`] or [`Error::SymlinkRace`] on the
/// corresponding exceptional condition.
pub fn walk(root: &Path, search: &DepthSearch, mut visit: impl FnMut(&Entry) -> Result<()>) -> Result<()> {
    if !search.recurse {
        let meta = fs::symlink_metadata(root)?;
        visit(&Entry {
            path: root.to_path_buf(),
            depth: 0,
            is_dir: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
        })?;
        return Ok(());
    }

    let includes = compile_patterns(&search.include_dirs)?;
    let excludes = compile_patterns(&search.exclude_dirs)?;
    let root_dev = fs::metadata(root)?.dev();

    descend(root, 0, search, &includes, &excludes, root_dev, &mut visit)
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| Error::InvalidPath(format!("bad pattern {p}: {e}"))))
        .collect()
}

fn matches_any(path: &Path, patterns: &[Regex]) -> bool {
    let s = path.to_string_lossy();
    patterns.iter().any(|re| re.is_match(&s))
}

/// Whether descending to `next_depth` is still within `search.max_depth`.
/// Exceeding this is a normal traversal boundary, not a fault: the entry
/// itself is still visited, only further descent into it stops. Compare
/// [`RECURSION_LIMIT`], which is fatal regardless of `max_depth`.
fn within_depth_budget(search: &DepthSearch, next_depth: u32) -> bool {
    search.max_depth.is_none_or(|max| next_depth <= max)
}

#[allow(clippy::too_many_arguments)]
fn descend(
    dir: &Path,
    depth: u32,
    search: &DepthSearch,
    includes: &[Regex],
    excludes: &[Regex],
    root_dev: u64,
    visit: &mut impl FnMut(&Entry) -> Result<()>,
) -> Result<()> {
    if depth > RECURSION_LIMIT {
        return Err(Error::RecursionLimitExceeded { path: dir.to_path_buf(), limit: RECURSION_LIMIT });
    }

    // Race-safe descent: capture identity before listing, and again right
    // before recursing into each child directory, rather than chdir'ing
    // into it. A mismatch means something was swapped underneath us.
    let before = DirIdentity::of(dir)?;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if !excludes.is_empty() && matches_any(&path, excludes) {
            continue;
        }
        if !includes.is_empty() && !matches_any(&path, includes) {
            continue;
        }

        if file_type.is_symlink() {
            if search.traverse_links && symlink_owner_is_trusted(&path)? {
                let target_meta = fs::metadata(&path)?;
                if target_meta.is_dir() {
                    if search.xdev && target_meta.dev() != root_dev {
                        debug!(path = %path.display(), "skipping symlinked directory on a different device");
                        continue;
                    }
                    visit(&Entry { path: path.clone(), depth: depth + 1, is_dir: true, is_symlink: true })?;
                    if within_depth_budget(search, depth + 1) {
                        descend(&path, depth + 1, search, includes, excludes, root_dev, visit)?;
                    }
                    continue;
                }
            }
            visit(&Entry { path, depth: depth + 1, is_dir: false, is_symlink: true })?;
            continue;
        }

        if file_type.is_dir() {
            if search.xdev {
                let child_dev = fs::metadata(&path)?.dev();
                if child_dev != root_dev {
                    debug!(path = %path.display(), "skipping directory on a different device (xdev)");
                    continue;
                }
            }
            visit(&Entry { path: path.clone(), depth: depth + 1, is_dir: true, is_symlink: false })?;
            if within_depth_budget(search, depth + 1) {
                descend(&path, depth + 1, search, includes, excludes, root_dev, visit)?;
            }
        } else {
            visit(&Entry { path, depth: depth + 1, is_dir: false, is_symlink: false })?;
        }
    }

    let after = DirIdentity::of(dir)?;
    if before != after {
        warn!(dir = %dir.display(), "directory identity changed during traversal");
        return Err(Error::BrokenDirectoryInvariant { path: dir.to_path_buf() });
    }

    Ok(())
}

/// A symlink may only be traversed if it is owned by root or by the
/// effective uid of the running process.
fn symlink_owner_is_trusted(path: &Path) -> Result<bool> {
    let meta = fs::symlink_metadata(path)?;
    let euid = Uid::effective().as_raw();
    Ok(meta.uid() == 0 || meta.uid() == euid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn default_search() -> DepthSearch {
        DepthSearch {
            recurse: true,
            max_depth: None,
            include_dirs: vec![],
            exclude_dirs: vec![],
            traverse_links: false,
            xdev: false,
        }
    }

    #[test]
    fn non_recursive_visits_only_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("child"), b"x").unwrap();
        let search = DepthSearch { recurse: false, ..default_search() };
        let mut seen = Vec::new();
        walk(dir.path(), &search, |e| {
            seen.push(e.path.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn recursive_visits_nested_entries() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/file"), b"x").unwrap();
        let search = default_search();
        let mut seen = Vec::new();
        walk(dir.path(), &search, |e| {
            seen.push(e.path.clone());
            Ok(())
        })
        .unwrap();
        assert!(seen.iter().any(|p| p.ends_with("sub")));
        assert!(seen.iter().any(|p| p.ends_with("sub/file")));
    }

    #[test]
    fn max_depth_stops_descending_without_failing_the_promise() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        let search = DepthSearch { max_depth: Some(0), ..default_search() };
        let mut seen = Vec::new();
        walk(dir.path(), &search, |e| {
            seen.push(e.path.clone());
            Ok(())
        })
        .unwrap();
        assert!(seen.iter().any(|p| p.ends_with("a")));
        assert!(!seen.iter().any(|p| p.ends_with("a/b")));
    }

    #[test]
    fn recursion_limit_is_fatal_even_without_max_depth_configured() {
        let dir = tempdir().unwrap();
        let search = default_search();
        let result = descend(dir.path(), RECURSION_LIMIT + 1, &search, &[], &[], 0, &mut |_| Ok(()));
        assert!(matches!(result, Err(Error::RecursionLimitExceeded { limit, .. }) if limit == RECURSION_LIMIT));
    }

    #[test]
    fn exclude_pattern_skips_matching_entries() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("skip_me")).unwrap();
        fs::create_dir(dir.path().join("keep_me")).unwrap();
        let search = DepthSearch { exclude_dirs: vec!["skip_me".to_string()], ..default_search() };
        let mut seen = Vec::new();
        walk(dir.path(), &search, |e| {
            seen.push(e.path.clone());
            Ok(())
        })
        .unwrap();
        assert!(!seen.iter().any(|p| p.ends_with("skip_me")));
        assert!(seen.iter().any(|p| p.ends_with("keep_me")));
    }
}

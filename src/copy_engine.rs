// src/copy_engine.rs

//! C5: Copy Engine.
//!
//! Implements the Write-Replace protocol (atomic temp-file-plus-rename,
//! with a `.cfsaved` backup of whatever was at the destination and a
//! rollback path if post-write verification fails), Link Materialization
//! (symlink or hardlink, consulting [`crate::hardlink_map`] to preserve
//! topology), and Purge (removing destination entries the source no longer
//! has, subject to two independent guard clauses).
//!
//! The Write-Replace protocol here follows the hardlink-then-copy-fallback,
//! atomic temp+rename shape common to package-manager style deployers, with
//! an EXDEV cross-device fallback (copy+fsync+remove) for the rename step.

use crate::error::{Error, Result};
use crate::hardlink_map::HardlinkMap;
use crate::outcome::{Outcome, Report};
use crate::pathutil::safe_join;
use crate::promise::{CopyFrom, Link, Purge};
use crate::state::AgentState;
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix applied to the pre-replace backup of a destination.
pub const BACKUP_SUFFIX: &str = ".cfsaved";
/// Suffix applied to the temp file used by the write-replace protocol.
pub const STAGING_SUFFIX: &str = ".cfnew";

fn staged_path(dest: &Path) -> PathBuf {
    let mut s = dest.as_os_str().to_os_string();
    s.push(STAGING_SUFFIX);
    PathBuf::from(s)
}

fn backup_path(dest: &Path) -> PathBuf {
    let mut s = dest.as_os_str().to_os_string();
    s.push(BACKUP_SUFFIX);
    PathBuf::from(s)
}

/// Materialize `source`'s content at `dest` using the Write-Replace
/// protocol: stage to `dest.cfnew`, fsync, back up any existing `dest` to
/// `dest.cfsaved`, rename the staged file into place, and if the
/// post-write verification (matching byte length) fails, roll the backup
/// back into place and report `Fail`.
pub fn write_replace(source: &Path, dest: &Path, mode: u32, preserve_backup: bool) -> Result<Report> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let staged = staged_path(dest);
    copy_file_contents(source, &staged)?;
    fs::set_permissions(&staged, fs::Permissions::from_mode(mode))?;

    let had_previous = dest.exists();
    let backup = backup_path(dest);
    if had_previous {
        fs::rename(dest, &backup)?;
    }

    match fs::rename(&staged, dest) {
        Ok(()) => {}
        Err(e) => {
            if had_previous {
                let _ = fs::rename(&backup, dest);
            }
            return Err(Error::Io(e));
        }
    }

    if !verify_write(source, dest)? {
        warn!(dest = %dest.display(), "write-replace verification failed, rolling back");
        fs::remove_file(dest).ok();
        if had_previous {
            fs::rename(&backup, dest)?;
        }
        return Ok(Report::new(dest, Outcome::Fail, "post-write verification failed, rolled back"));
    }

    if had_previous && !preserve_backup {
        fs::remove_file(&backup).ok();
    }

    info!(dest = %dest.display(), "copied via write-replace");
    Ok(Report::new(dest, Outcome::Change, format!("copied from {}", source.display())))
}

fn verify_write(source: &Path, dest: &Path) -> Result<bool> {
    let src_len = fs::metadata(source)?.len();
    let dest_len = fs::metadata(dest)?.len();
    Ok(src_len == dest_len)
}

/// Copy `source`'s bytes into `dest_path`, falling back to a read+write
/// loop on cross-device `EXDEV` the way `transaction::move_file_atomic`
/// does for renames.
fn copy_file_contents(source: &Path, dest_path: &Path) -> Result<()> {
    match fs::copy(source, dest_path) {
        Ok(_) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            let mut reader = File::open(source)?;
            let mut writer = File::create(dest_path)?;
            std::io::copy(&mut reader, &mut writer)?;
            writer.sync_all()?;
            Ok(())
        }
        Err(e) => Err(Error::Io(e)),
    }
}

/// Deploy a promise's `copy_from` request, preferring a hard link over a
/// byte copy when `link_instead` is set and the two paths share a device,
/// and consulting the hard-link map so multiple promisers copying from the
/// same source inode in one run end up hard-linked to each other too.
pub fn copy_from(
    dest: &Path,
    copy_from: &CopyFrom,
    mode: u32,
    state: &AgentState,
    hardlinks: &HardlinkMap,
) -> Result<Report> {
    if copy_from.source_host.is_some() {
        return Err(Error::Fail("remote copy_from requires a RemoteSource (see crate::remote)".to_string()));
    }

    let source = &copy_from.source;
    if !source.exists() {
        return Ok(Report::new(dest, Outcome::Fail, format!("source {} does not exist", source.display())));
    }

    if let Some(canonical_dest) = hardlinks.register_or_lookup(source, dest).map_err(Error::Io)? {
        HardlinkMap::link(&canonical_dest, dest).map_err(Error::Io)?;
        return Ok(Report::new(dest, Outcome::Change, format!("hard-linked to {}", canonical_dest.display())));
    }

    if copy_from.link_instead && same_device(source, dest)? {
        if dest.exists() {
            fs::remove_file(dest)?;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::hard_link(source, dest)?;
        return Ok(Report::new(dest, Outcome::Change, "hard-linked per link_instead"));
    }

    state.mark_single_copy(source);
    write_replace(source, dest, mode, copy_from.copy_backup)
}

fn same_device(a: &Path, b_parent_hint: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;
    let a_dev = fs::metadata(a)?.dev();
    let probe = b_parent_hint.parent().unwrap_or(b_parent_hint);
    let b_dev = fs::metadata(probe).unwrap_or(fs::metadata(a)?).dev();
    Ok(a_dev == b_dev)
}

/// Materialize a `Link` promise at `dest`.
pub fn materialize_link(dest: &Path, link: &Link) -> Result<Report> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if dest.symlink_metadata().is_ok() {
        if dest.is_dir() && !link.hard {
            return Ok(Report::new(dest, Outcome::Warn, "refusing to replace a directory with a link"));
        }
        fs::remove_file(dest)?;
    }

    if link.hard {
        fs::hard_link(&link.target, dest)?;
    } else {
        std::os::unix::fs::symlink(&link.target, dest)?;
    }

    Ok(Report::new(dest, Outcome::Change, format!("linked to {}", link.target.display())))
}

/// Create `dest` (and any missing parents) as an empty directory or file
/// when a promise says `create = true` and nothing exists yet ("auto-define").
pub fn auto_define(dest: &Path, as_directory: bool, state: &AgentState) -> Result<Report> {
    if dest.exists() {
        return Ok(Report::new(dest, Outcome::Noop, "already exists"));
    }
    if as_directory {
        fs::create_dir_all(dest)?;
        state.mark_auto_defined(dest);
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(dest)?.sync_all()?;
    }
    Ok(Report::new(dest, Outcome::Change, "auto-defined"))
}

/// Remove destination entries under `dest_root` that no longer exist under
/// `source_root`, honoring two independent guard clauses: a length gate
/// (refuses to purge a target path shorter than 2 characters, i.e. empty
/// or `/`) and an authentication gate (refuses a remote-sourced purge
/// unless the caller asserts the remote side authenticated).
pub fn purge(dest_root: &Path, source_root: &Path, purge: &Purge, is_remote_source: bool) -> Result<Vec<Report>> {
    let dest_str = dest_root.to_string_lossy();
    if dest_str.len() < 2 {
        return Ok(vec![Report::new(dest_root, Outcome::Denied, "refusing to purge an empty or root target path")]);
    }
    if is_remote_source && !purge.authenticated_remote {
        return Ok(vec![Report::new(dest_root, Outcome::Denied, "refusing to purge without remote authentication")]);
    }
    if !purge.enabled {
        return Ok(vec![]);
    }

    let mut reports = Vec::new();
    for entry in fs::read_dir(dest_root)? {
        let entry = entry?;
        let dest_path = entry.path();
        let rel = dest_path.strip_prefix(dest_root).unwrap_or(&dest_path);
        let expected_source = match safe_join(source_root, rel) {
            Ok(p) => p,
            Err(_) => continue,
        };
        if !expected_source.exists() {
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&dest_path)?;
            } else {
                fs::remove_file(&dest_path)?;
            }
            debug!(path = %dest_path.display(), "purged stale destination entry");
            reports.push(Report::new(&dest_path, Outcome::Change, "purged (no longer present at source)"));
        }
    }
    Ok(reports)
}

// src/rename.rs

//! C4: Name Reconciler.
//!
//! Handles the three `Rename` modes a promise can ask for before the copy
//! engine touches the promiser path: moving it aside entirely (`To`),
//! disabling it in place (`Disable`), or cascading it through a bounded
//! series of numbered backups (`Rotate`).

use crate::error::{Error, Result};
use crate::outcome::{Outcome, Report};
use crate::promise::Rename;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Default suffix applied by `Rename::Disable`.
pub const DISABLE_SUFFIX: &str = ".cfdisabled";

/// Default mode applied to a disabled regular file when no `plus`/`minus`
/// bits are supplied.
pub const DISABLE_DEFAULT_MODE: u32 = 0o600;

/// Reconcile the promiser's name per `mode`. Returns the path the copy
/// engine should now treat as the promiser (unchanged unless a rename
/// actually happened).
pub fn reconcile(promiser: &Path, mode: &Rename) -> Result<(PathBuf, Report)> {
    match mode {
        Rename::None => Ok((promiser.to_path_buf(), Report::new(promiser, Outcome::Noop, "no rename requested"))),
        Rename::To(dest) => rename_to(promiser, dest),
        Rename::Disable => disable(promiser),
        Rename::Rotate { levels } => rotate(promiser, *levels),
        Rename::Truncate => truncate(promiser),
        Rename::Delete { rmdirs } => delete(promiser, *rmdirs),
    }
}

fn rename_to(promiser: &Path, dest: &Path) -> Result<(PathBuf, Report)> {
    if !promiser.exists() {
        return Ok((promiser.to_path_buf(), Report::new(promiser, Outcome::Noop, "nothing to rename")));
    }
    if dest.exists() {
        return Ok((
            promiser.to_path_buf(),
            Report::new(promiser, Outcome::Fail, format!("rename target {} already exists", dest.display())),
        ));
    }
    fs::rename(promiser, dest)?;
    Ok((dest.to_path_buf(), Report::new(promiser, Outcome::Change, format!("renamed to {}", dest.display()))))
}

fn disable(promiser: &Path) -> Result<(PathBuf, Report)> {
    let meta = match fs::symlink_metadata(promiser) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok((promiser.to_path_buf(), Report::new(promiser, Outcome::Noop, "nothing to disable")));
        }
        Err(e) => return Err(e.into()),
    };

    // A symlink promiser is unlinked in place, never moved aside: renaming
    // it would just relocate the link, leaving whatever it points at
    // untouched and a dangling link where the promiser used to be.
    if meta.file_type().is_symlink() {
        fs::remove_file(promiser)?;
        return Ok((promiser.to_path_buf(), Report::new(promiser, Outcome::Change, "disabled symlink by unlinking")));
    }

    let disabled = append_suffix(promiser, DISABLE_SUFFIX);
    if disabled.exists() {
        fs::remove_file(&disabled).or_else(|_| fs::remove_dir_all(&disabled))?;
    }
    fs::rename(promiser, &disabled)?;

    if disabled.is_file() {
        fs::set_permissions(&disabled, fs::Permissions::from_mode(DISABLE_DEFAULT_MODE))?;
    }

    Ok((disabled.clone(), Report::new(promiser, Outcome::Change, format!("disabled to {}", disabled.display()))))
}

/// `open(O_CREAT|O_TRUNC)` then close. Idempotent: an already-empty (or
/// absent) promiser reports `Noop`.
fn truncate(promiser: &Path) -> Result<(PathBuf, Report)> {
    let was_empty = fs::symlink_metadata(promiser).map(|m| m.len() == 0).unwrap_or(false);
    OpenOptions::new().create(true).write(true).truncate(true).open(promiser)?;
    Ok(if was_empty {
        (promiser.to_path_buf(), Report::new(promiser, Outcome::Noop, "already empty"))
    } else {
        (promiser.to_path_buf(), Report::new(promiser, Outcome::Change, "truncated"))
    })
}

/// Unlink the promiser. Directories require `rmdirs`; without it, a
/// directory promiser is left untouched and reported `Warn` rather than
/// silently ignored. The recursion base directory of a `depth_search`
/// promise is never reached through this path — only the promiser itself
/// is ever deleted here, never a leaf discovered during traversal.
fn delete(promiser: &Path, rmdirs: bool) -> Result<(PathBuf, Report)> {
    let meta = match fs::symlink_metadata(promiser) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok((promiser.to_path_buf(), Report::new(promiser, Outcome::Noop, "already absent")));
        }
        Err(e) => return Err(e.into()),
    };

    if meta.is_dir() {
        if !rmdirs {
            return Ok((
                promiser.to_path_buf(),
                Report::new(promiser, Outcome::Warn, "refusing to delete a directory without rmdirs"),
            ));
        }
        fs::remove_dir_all(promiser)?;
    } else {
        fs::remove_file(promiser)?;
    }

    Ok((promiser.to_path_buf(), Report::new(promiser, Outcome::Change, "deleted")))
}

/// Cascades `name.(n-1) -> name.n`, ..., `name -> name.0`, from the highest
/// index down. If `name.levels` already exists before the shift begins it
/// is dropped (deleted) rather than erroring.
fn rotate(promiser: &Path, levels: u32) -> Result<(PathBuf, Report)> {
    if levels == 0 {
        return Err(Error::InvalidPath("rotate levels must be >= 1".to_string()));
    }
    if !promiser.exists() {
        return Ok((promiser.to_path_buf(), Report::new(promiser, Outcome::Noop, "nothing to rotate")));
    }

    let highest = numbered(promiser, levels - 1);
    if highest.exists() {
        if highest.is_dir() {
            fs::remove_dir_all(&highest)?;
        } else {
            fs::remove_file(&highest)?;
        }
    }

    for i in (1..levels).rev() {
        let from = numbered(promiser, i - 1);
        let to = numbered(promiser, i);
        if from.exists() {
            fs::rename(&from, &to)?;
        }
    }

    let first = numbered(promiser, 0);
    fs::rename(promiser, &first)?;

    Ok((first.clone(), Report::new(promiser, Outcome::Change, format!("rotated through {levels} levels, now at {}", first.display()))))
}

fn numbered(promiser: &Path, index: u32) -> PathBuf {
    let mut s = promiser.as_os_str().to_os_string();
    s.push(format!(".{index}"));
    PathBuf::from(s)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

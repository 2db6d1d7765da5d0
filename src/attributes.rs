// src/attributes.rs

//! C3: Attribute Reconciler.
//!
//! Brings owner/group/mode in line with a promise's `Perms`, records the
//! observed `{mode, uid, gid, dev, ino, mtime}` snapshot in the stats DB and
//! reports any divergence found against the *previous* snapshot (drift that
//! happened outside this engine between runs), and carries a setuid/setgid
//! audit on every reconciled file: a root-owned setuid/setgid bit is a
//! one-shot security alert the first time it is seen, not an ordinary mode
//! fix.
//!
//! `check_integrity` is this component's other half of the "Integrity
//! (hash) -> Change detection" dataflow step: an independent content-hash
//! comparison against HASHDB's history, unrelated to the copy comparator in
//! [`crate::compare`].

use crate::error::Result;
use crate::hash::hash_file;
use crate::hashdb::{HashComparison, HashDb};
use crate::outcome::{Outcome, Report};
use crate::promise::{Change, GidSpec, Perms, ReportChanges, UidSpec};
use crate::state::AgentState;
use crate::statsdb::{FileStat, StatsDb};
use nix::unistd::{Gid, Group, Uid, User};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use tracing::{debug, info, warn};

const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;

const R_USR: u32 = 0o400;
const X_USR: u32 = 0o100;
const R_GRP: u32 = 0o040;
const X_GRP: u32 = 0o010;
const R_OTH: u32 = 0o004;
const X_OTH: u32 = 0o001;

/// How a candidate owner/group list resolved against the current id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdResolution {
    /// An entry in the list already matches the current id; leave it alone.
    Keep,
    /// No entry matched; apply this id.
    Set(u32),
    /// The list had entries but none of them were resolvable/applicable
    /// (e.g. only `Unknown`, or a `Name` that doesn't resolve on this
    /// system).
    Unresolvable,
}

/// Resolve a `Perms::owners` list against the current uid, per spec: keep
/// the current owner if any entry matches it; otherwise apply the first
/// entry that isn't `Unknown`. An empty list means "no constraint",
/// equivalent to `Keep`.
fn resolve_uid(owners: &[UidSpec], current_uid: u32) -> Result<IdResolution> {
    if owners.is_empty() {
        return Ok(IdResolution::Keep);
    }
    for spec in owners {
        let matches_current = match spec {
            UidSpec::Same => true,
            UidSpec::Unknown => false,
            UidSpec::Id(id) => *id == current_uid,
            UidSpec::Name(name) => resolve_uid_name(name)? == Some(current_uid),
        };
        if matches_current {
            return Ok(IdResolution::Keep);
        }
    }
    for spec in owners {
        match spec {
            UidSpec::Id(id) => return Ok(IdResolution::Set(*id)),
            UidSpec::Name(name) => {
                if let Some(id) = resolve_uid_name(name)? {
                    return Ok(IdResolution::Set(id));
                }
            }
            UidSpec::Same | UidSpec::Unknown => {}
        }
    }
    Ok(IdResolution::Unresolvable)
}

fn resolve_uid_name(name: &str) -> Result<Option<u32>> {
    if let Ok(id) = name.parse::<u32>() {
        return Ok(Some(id));
    }
    Ok(User::from_name(name)?.map(|u| u.uid.as_raw()))
}

/// The group-side counterpart of [`resolve_uid`].
fn resolve_gid(groups: &[GidSpec], current_gid: u32) -> Result<IdResolution> {
    if groups.is_empty() {
        return Ok(IdResolution::Keep);
    }
    for spec in groups {
        let matches_current = match spec {
            GidSpec::Same => true,
            GidSpec::Unknown => false,
            GidSpec::Id(id) => *id == current_gid,
            GidSpec::Name(name) => resolve_gid_name(name)? == Some(current_gid),
        };
        if matches_current {
            return Ok(IdResolution::Keep);
        }
    }
    for spec in groups {
        match spec {
            GidSpec::Id(id) => return Ok(IdResolution::Set(*id)),
            GidSpec::Name(name) => {
                if let Some(id) = resolve_gid_name(name)? {
                    return Ok(IdResolution::Set(id));
                }
            }
            GidSpec::Same | GidSpec::Unknown => {}
        }
    }
    Ok(IdResolution::Unresolvable)
}

fn resolve_gid_name(name: &str) -> Result<Option<u32>> {
    if let Ok(id) = name.parse::<u32>() {
        return Ok(Some(id));
    }
    Ok(Group::from_name(name)?.map(|g| g.gid.as_raw()))
}

fn resolve_mode(perms: &Perms, current_mode: u32) -> u32 {
    let mut mode = perms.mode.unwrap_or(current_mode);
    if let Some(plus) = perms.plus {
        mode |= plus;
    }
    if let Some(minus) = perms.minus {
        mode &= !minus;
    }
    mode
}

/// Force the execute bit on for every read bit a directory mode carries,
/// after `mode`/`plus`/`minus` have already been applied.
fn force_dir_execute_bits(mode: u32) -> u32 {
    let mut m = mode;
    if m & R_USR != 0 {
        m |= X_USR;
    }
    if m & R_GRP != 0 {
        m |= X_GRP;
    }
    if m & R_OTH != 0 {
        m |= X_OTH;
    }
    m
}

/// BSD `chflags` bits have no Linux equivalent; this is a capability no-op
/// that logs instead of silently dropping the request.
fn apply_flags(path: &Path, perms: &Perms) {
    if perms.plus_flags.is_some() || perms.minus_flags.is_some() {
        debug!(path = %path.display(), "BSD file flags requested but unsupported on this platform");
    }
}

/// Classic Mac OS/HFS+ finder type/creator codes are Darwin-only.
fn apply_findertype(path: &Path, perms: &Perms) {
    if perms.findertype.is_some() {
        debug!(path = %path.display(), "finder type requested but unsupported on this platform");
    }
}

/// POSIX ACLs require a platform ACL backend this crate doesn't carry yet.
fn apply_acl(path: &Path, perms: &Perms) {
    if !perms.acl.is_empty() {
        debug!(path = %path.display(), acl_entries = perms.acl.len(), "ACL entries requested but unsupported on this platform");
    }
}

/// Reconcile the attributes of `path` against `perms`. `state` provides the
/// one-shot setuid/setgid watchlist; the audit only fires for root-owned
/// (post-reconciliation) files. Also performs out-of-band stat-change
/// detection: the observed `{mode, uid, gid, dev, ino, mtime}` before any
/// mutation here is diffed against the last snapshot `stats` recorded, so a
/// divergence caused by something other than this engine between two runs
/// is still surfaced.
pub fn reconcile(path: &Path, perms: &Perms, state: &AgentState, stats: &StatsDb) -> Result<Report> {
    let meta = fs::symlink_metadata(path)?;
    let current_mode = meta.permissions().mode() & 0o7777;
    let is_dir = meta.file_type().is_dir();

    let previous_stat = stats.lookup(path)?;
    let observed_stat = FileStat {
        mode: current_mode,
        uid: meta.uid(),
        gid: meta.gid(),
        dev: meta.dev(),
        ino: meta.ino(),
        mtime: meta.mtime(),
    };
    let out_of_band_change = previous_stat.as_ref().is_some_and(|prev| *prev != observed_stat);
    if out_of_band_change {
        info!(path = %path.display(), "stat snapshot diverged from last recorded state");
    }

    let uid_resolution = resolve_uid(&perms.owners, meta.uid())?;
    let gid_resolution = resolve_gid(&perms.groups, meta.gid())?;

    let mut warnings = Vec::new();
    let desired_uid = match uid_resolution {
        IdResolution::Set(uid) => uid,
        _ => meta.uid(),
    };
    let desired_gid = match gid_resolution {
        IdResolution::Set(gid) => gid,
        _ => meta.gid(),
    };
    if matches!(uid_resolution, IdResolution::Unresolvable) {
        warnings.push("owner list has no entry resolvable on this system".to_string());
    }
    if matches!(gid_resolution, IdResolution::Unresolvable) {
        warnings.push("group list has no entry resolvable on this system".to_string());
    }

    let mut changed = false;

    if desired_uid != meta.uid() || desired_gid != meta.gid() {
        nix::unistd::chown(path, Some(Uid::from_raw(desired_uid)), Some(Gid::from_raw(desired_gid)))?;
        changed = true;
    }

    let mut desired_mode = resolve_mode(perms, current_mode);
    if perms.rxdirs && is_dir {
        desired_mode = force_dir_execute_bits(desired_mode);
    }

    if desired_mode != current_mode {
        fs::set_permissions(path, fs::Permissions::from_mode(desired_mode))?;
        changed = true;
    }

    apply_flags(path, perms);
    apply_findertype(path, perms);
    apply_acl(path, perms);

    audit_setuid(path, desired_uid, desired_mode, state);

    let refreshed = fs::symlink_metadata(path)?;
    stats.store(
        path,
        &FileStat {
            mode: refreshed.permissions().mode() & 0o7777,
            uid: refreshed.uid(),
            gid: refreshed.gid(),
            dev: refreshed.dev(),
            ino: refreshed.ino(),
            mtime: refreshed.mtime(),
        },
    )?;

    if !warnings.is_empty() {
        return Ok(Report::new(path, Outcome::Fail, warnings.join("; ")));
    }

    Ok(if changed {
        Report::new(path, Outcome::Change, "attributes reconciled")
    } else if out_of_band_change {
        Report::new(path, Outcome::Change, "out-of-band stat change detected since last run")
    } else {
        Report::new(path, Outcome::Noop, "attributes already converged")
    })
}

/// Content-hash Integrity step: compares `path`'s current digest against
/// HASHDB's recorded history, independent of whatever comparator decided
/// whether a copy was needed. A no-op when `change.report_changes` doesn't
/// ask for content-level reporting.
pub fn check_integrity(path: &Path, change: &Change, hashdb: &HashDb) -> Result<Option<Report>> {
    if !matches!(change.report_changes, ReportChanges::Content | ReportChanges::All) {
        return Ok(None);
    }
    let digest = hash_file(change.hash, path)?;
    let comparison = hashdb.file_hash_changed(change.hash, path, digest.as_str(), change.update)?;
    Ok(Some(match comparison {
        HashComparison::Changed => Report::new(path, Outcome::Change, "content changed since last recorded hash"),
        HashComparison::New | HashComparison::Unchanged => Report::new(path, Outcome::Noop, "content unchanged"),
    }))
}

/// Root-owned setuid/setgid files raise a one-shot alert per run; a
/// setuid binary owned by a regular user is left to ordinary mode
/// reconciliation instead.
fn audit_setuid(path: &Path, owner_uid: u32, mode: u32, state: &AgentState) {
    if owner_uid != 0 {
        return;
    }
    if mode & (S_ISUID | S_ISGID) == 0 {
        return;
    }
    if state.flag_setuid_once(path) {
        warn!(path = %path.display(), mode = format!("{mode:o}"), "root-owned setuid/setgid file");
    }
}

// src/dispatcher.rs

//! C7: Promise Dispatcher.
//!
//! The entry point for evaluating one [`crate::promise::Promise`]: runs the
//! name reconciler, then the comparison oracle (when the promise has a
//! `copy_from`), then the copy engine or link materializer, then the
//! attribute reconciler, the integrity (content-hash) step, then an optional
//! purge pass and depth-search recursion — combining every step's
//! [`Outcome`] into the one reported for the promiser as a whole via
//! [`Outcome::combine`].
//!
//! A `depth_search` combined with `copy_from` traverses the *source* tree,
//! not the destination: the destination may not even exist yet, and what
//! drives a recursive copy is "what does the source have", not "what
//! already happens to be sitting at the destination". Every entry found
//! this way is rebased onto the destination root and run through the same
//! per-leaf { compare -> copy -> attributes -> integrity } pipeline as a
//! single-file promise, so hard-link topology recorded in
//! [`crate::hardlink_map`] is preserved across the whole tree. A
//! `depth_search` with no `copy_from` instead walks the destination itself
//! and only reconciles attributes/integrity on what it finds there.
//!
//! `transaction.action = warn` downgrades every `Change` this evaluation
//! would otherwise have made into a `Warn` and skips the corresponding
//! filesystem mutation entirely.

use crate::attributes;
use crate::compare::{compare, Comparison};
use crate::copy_engine;
use crate::error::Result;
use crate::hardlink_map::HardlinkMap;
use crate::hashdb::HashDb;
use crate::outcome::{Outcome, Report};
use crate::pathutil::safe_join;
use crate::promise::{Action, Attributes, CopyFrom, Promise, TypeCheck};
use crate::rename;
use crate::state::AgentState;
use crate::statsdb::StatsDb;
use crate::traversal::{self, Entry};
use std::fs;
use std::path::Path;
use tracing::info_span;

/// Shared collaborators a dispatcher run needs across every promise it
/// evaluates (process-wide state, plus the two persistent databases).
pub struct EngineContext {
    pub hashdb: HashDb,
    pub statsdb: StatsDb,
    pub state: AgentState,
    pub hardlinks: HardlinkMap,
}

impl EngineContext {
    pub fn new(hashdb: HashDb, statsdb: StatsDb) -> Self {
        Self { hashdb, statsdb, state: AgentState::new(), hardlinks: HardlinkMap::new() }
    }
}

/// Evaluate one promise, returning every [`Report`] produced (one per
/// reconciled path when `depth_search` recurses, otherwise exactly one).
pub fn evaluate(promise: &Promise, ctx: &EngineContext) -> Result<Vec<Report>> {
    let _span = info_span!("promise", promiser = %promise.promiser.display()).entered();
    let attrs = &promise.attrs;
    let warn_only = attrs.action == Action::Warn;

    let (promiser, rename_report) = rename::reconcile(&promise.promiser, &attrs.rename)?;
    let mut reports = vec![downgrade_if_warn(rename_report, warn_only)];

    if !promiser.exists() && attrs.create {
        let as_dir = matches!(attrs.type_check, TypeCheck::Directory);
        if warn_only {
            reports.push(Report::new(&promiser, Outcome::Warn, "would auto-define"));
        } else {
            reports.push(copy_engine::auto_define(&promiser, as_dir, &ctx.state)?);
        }
    }

    // A recursive copy_from is driven by traversing the *source* tree below;
    // the destination is a directory, not something a single `fs::copy` call
    // can populate, so the ordinary single-file copy_from branch is skipped
    // in that case.
    let recursing_copy = attrs.copy_from.is_some() && attrs.depth_search.as_ref().is_some_and(|d| d.recurse);

    if let Some(copy_from) = &attrs.copy_from
        && !recursing_copy
    {
        let cmp = compare(copy_from.compare, &promiser, &copy_from.source).map_err(crate::error::Error::Io)?;
        match cmp {
            Comparison::Same => {
                reports.push(Report::new(&promiser, Outcome::Noop, "already matches copy_from source"));
            }
            Comparison::Missing | Comparison::Differs => {
                if warn_only {
                    reports.push(Report::new(&promiser, Outcome::Warn, "content diverges from copy_from source"));
                } else {
                    let mode = attrs.perms.mode.unwrap_or(0o644);
                    reports.push(copy_engine::copy_from(&promiser, copy_from, mode, &ctx.state, &ctx.hardlinks)?);
                }
            }
        }
    }

    if let Some(link) = &attrs.link {
        if warn_only {
            reports.push(Report::new(&promiser, Outcome::Warn, "link would be materialized"));
        } else {
            reports.push(copy_engine::materialize_link(&promiser, link)?);
        }
    }

    if !recursing_copy && promiser.exists() {
        if warn_only {
            reports.push(Report::new(&promiser, Outcome::Warn, "attributes would be reconciled"));
        } else {
            reports.push(attributes::reconcile(&promiser, &attrs.perms, &ctx.state, &ctx.statsdb)?);
            reports.extend(attributes::check_integrity(&promiser, &attrs.change, &ctx.hashdb)?);
        }
    }

    if let Some(search) = &attrs.depth_search
        && search.recurse
    {
        let mut nested = Vec::new();
        if let Some(copy_from) = &attrs.copy_from {
            if !promiser.exists() {
                if warn_only {
                    nested.push(Report::new(&promiser, Outcome::Warn, "destination directory would be created"));
                } else {
                    fs::create_dir_all(&promiser)?;
                    nested.push(Report::new(&promiser, Outcome::Change, "destination directory created to receive recursive copy"));
                }
            }
            if copy_from.source.is_dir() {
                traversal::walk(&copy_from.source, search, |entry: &Entry| {
                    nested.extend(reconcile_copy_leaf(entry, &copy_from.source, &promiser, copy_from, attrs, ctx, warn_only)?);
                    Ok(())
                })?;
            }
        } else if promiser.is_dir() {
            traversal::walk(&promiser, search, |entry: &Entry| {
                nested.extend(reconcile_leaf(entry, attrs, ctx, warn_only)?);
                Ok(())
            })?;
        }
        reports.extend(nested);
    }

    if let Some(purge_attrs) = &attrs.purge {
        let source_root = attrs.copy_from.as_ref().map(|c| c.source.clone());
        if let Some(source_root) = source_root {
            let is_remote = attrs.copy_from.as_ref().and_then(|c| c.source_host.as_ref()).is_some();
            if warn_only {
                reports.push(Report::new(&promiser, Outcome::Warn, "purge would run"));
            } else {
                reports.extend(copy_engine::purge(&promiser, &source_root, purge_attrs, is_remote)?);
            }
        }
    }

    // The promise comment is only ever surfaced to the caller on WARN/FAIL,
    // per the user-visible failure contract: a NOOP/CHANGE doesn't need the
    // author's annotation, but a divergence does.
    Ok(reports.into_iter().map(|r| r.with_comment(attrs.comment.clone())).collect())
}

/// Per-leaf handling for a `depth_search` with no `copy_from`: only
/// attributes and integrity are reconciled on whatever already exists at
/// each traversed destination path.
fn reconcile_leaf(entry: &Entry, attrs: &Attributes, ctx: &EngineContext, warn_only: bool) -> Result<Vec<Report>> {
    if entry.is_dir || entry.is_symlink {
        return Ok(vec![Report::new(&entry.path, Outcome::Noop, "traversed, no per-leaf attributes requested")]);
    }
    if fs::symlink_metadata(&entry.path).is_err() {
        return Ok(vec![Report::new(&entry.path, Outcome::Noop, "entry vanished during traversal")]);
    }
    if warn_only {
        return Ok(vec![Report::new(&entry.path, Outcome::Warn, "leaf attributes would be reconciled")]);
    }
    let mut reports = vec![attributes::reconcile(&entry.path, &attrs.perms, &ctx.state, &ctx.statsdb)?];
    reports.extend(attributes::check_integrity(&entry.path, &attrs.change, &ctx.hashdb)?);
    Ok(reports)
}

/// Per-leaf handling for a `depth_search` + `copy_from`: `entry` is a path
/// inside `source_root`; it is rebased onto `dest_root` and run through the
/// same compare -> copy -> attributes -> integrity pipeline a single-file
/// `copy_from` promise would use, constructing a per-leaf [`CopyFrom`] so
/// [`crate::hardlink_map::HardlinkMap`] sees every leaf individually and can
/// still preserve hard-link topology across the whole tree.
#[allow(clippy::too_many_arguments)]
fn reconcile_copy_leaf(
    entry: &Entry,
    source_root: &Path,
    dest_root: &Path,
    copy_from_base: &CopyFrom,
    attrs: &Attributes,
    ctx: &EngineContext,
    warn_only: bool,
) -> Result<Vec<Report>> {
    let rel = entry.path.strip_prefix(source_root).unwrap_or(&entry.path);
    let dest_path = safe_join(dest_root, rel)?;

    if entry.is_dir {
        if dest_path.exists() {
            return Ok(vec![Report::new(&dest_path, Outcome::Noop, "directory already mirrors source")]);
        }
        if warn_only {
            return Ok(vec![Report::new(&dest_path, Outcome::Warn, "directory would be created")]);
        }
        fs::create_dir_all(&dest_path)?;
        return Ok(vec![Report::new(&dest_path, Outcome::Change, "directory created to mirror source tree")]);
    }

    if entry.is_symlink {
        let target = fs::read_link(&entry.path)?;
        let current = fs::read_link(&dest_path).ok();
        if current.as_deref() == Some(target.as_path()) {
            return Ok(vec![Report::new(&dest_path, Outcome::Noop, "symlink already matches source")]);
        }
        if warn_only {
            return Ok(vec![Report::new(&dest_path, Outcome::Warn, "symlink would be recreated")]);
        }
        if fs::symlink_metadata(&dest_path).is_ok() {
            fs::remove_file(&dest_path)?;
        }
        std::os::unix::fs::symlink(&target, &dest_path)?;
        return Ok(vec![Report::new(&dest_path, Outcome::Change, "symlink recreated to match source")]);
    }

    let leaf_copy_from = CopyFrom { source: entry.path.clone(), ..copy_from_base.clone() };
    let mut reports = Vec::new();

    let cmp = compare(leaf_copy_from.compare, &dest_path, &leaf_copy_from.source).map_err(crate::error::Error::Io)?;
    match cmp {
        Comparison::Same => {
            reports.push(Report::new(&dest_path, Outcome::Noop, "already matches copy_from source"));
        }
        Comparison::Missing | Comparison::Differs => {
            if warn_only {
                reports.push(Report::new(&dest_path, Outcome::Warn, "content diverges from copy_from source"));
                return Ok(reports);
            }
            let mode = attrs.perms.mode.unwrap_or(0o644);
            reports.push(copy_engine::copy_from(&dest_path, &leaf_copy_from, mode, &ctx.state, &ctx.hardlinks)?);
        }
    }

    if warn_only {
        reports.push(Report::new(&dest_path, Outcome::Warn, "leaf attributes would be reconciled"));
        return Ok(reports);
    }

    reports.push(attributes::reconcile(&dest_path, &attrs.perms, &ctx.state, &ctx.statsdb)?);
    reports.extend(attributes::check_integrity(&dest_path, &attrs.change, &ctx.hashdb)?);
    Ok(reports)
}

fn downgrade_if_warn(report: Report, warn_only: bool) -> Report {
    if warn_only && report.outcome == Outcome::Change {
        Report::new(report.promiser, Outcome::Warn, report.message)
    } else {
        report
    }
}

/// Fold a set of per-path reports into the single outcome that should be
/// reported for the promise as a whole.
pub fn combined_outcome(reports: &[Report]) -> Outcome {
    reports.iter().fold(Outcome::Noop, |acc, r| acc.combine(r.outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::{Attributes, CopyFrom, CompareMethod};
    use tempfile::tempdir;

    fn fresh_ctx() -> EngineContext {
        EngineContext::new(HashDb::open_in_memory().unwrap(), StatsDb::open_in_memory().unwrap())
    }

    #[test]
    fn missing_destination_gets_copied() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        let dest = dir.path().join("dest");
        fs::write(&source, b"content").unwrap();

        let promise = Promise::new(
            &dest,
            Attributes {
                create: true,
                copy_from: Some(CopyFrom {
                    source: source.clone(),
                    source_host: None,
                    compare: CompareMethod::Binary,
                    preserve: false,
                    copy_backup: false,
                    link_instead: false,
                    copy_links_matching: None,
                }),
                ..Attributes::default()
            },
        );

        let ctx = fresh_ctx();
        let reports = evaluate(&promise, &ctx).unwrap();
        assert_eq!(combined_outcome(&reports), Outcome::Change);
        assert_eq!(fs::read(&dest).unwrap(), b"content");
    }

    #[test]
    fn up_to_date_destination_is_noop() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        let dest = dir.path().join("dest");
        fs::write(&source, b"same").unwrap();
        fs::write(&dest, b"same").unwrap();

        let promise = Promise::new(
            &dest,
            Attributes {
                copy_from: Some(CopyFrom {
                    source: source.clone(),
                    source_host: None,
                    compare: CompareMethod::Binary,
                    preserve: false,
                    copy_backup: false,
                    link_instead: false,
                    copy_links_matching: None,
                }),
                ..Attributes::default()
            },
        );

        let ctx = fresh_ctx();
        let reports = evaluate(&promise, &ctx).unwrap();
        assert_eq!(combined_outcome(&reports), Outcome::Noop);
    }

    #[test]
    fn warn_only_action_never_mutates() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        let dest = dir.path().join("dest");
        fs::write(&source, b"content").unwrap();

        let promise = Promise::new(
            &dest,
            Attributes {
                create: true,
                action: Action::Warn,
                copy_from: Some(CopyFrom {
                    source: source.clone(),
                    source_host: None,
                    compare: CompareMethod::Binary,
                    preserve: false,
                    copy_backup: false,
                    link_instead: false,
                    copy_links_matching: None,
                }),
                ..Attributes::default()
            },
        );

        let ctx = fresh_ctx();
        let reports = evaluate(&promise, &ctx).unwrap();
        assert_eq!(combined_outcome(&reports), Outcome::Warn);
        assert!(!dest.exists());
    }
}

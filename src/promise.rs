// src/promise.rs

//! Data model: the declarative shape a caller hands the engine.
//!
//! `Promise`/`Attributes` are plain, `serde`-deserializable structs — the
//! evaluation context that would normally resolve variables and policy
//! language into these values is out of scope; this is just
//! the resolved shape the rest of the engine consumes, and what the CLI
//! loads from a TOML/JSON file for a one-shot run.

use crate::hash::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What kind of promised object a promiser path should become.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCheck {
    File,
    Directory,
    Symlink,
    /// Any of the above is acceptable; only attributes are reconciled.
    Any,
}

/// `transaction.action`: whether a detected divergence should
/// actually be fixed, or only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    Fix,
    Warn,
}

/// Name-reconciliation mode. At most one is active per promise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rename {
    #[default]
    None,
    Disable,
    Rotate { levels: u32 },
    To(PathBuf),
    /// `open(O_CREAT|O_TRUNC)` then close: empties the promiser in place
    /// without unlinking it.
    Truncate,
    /// Unlink the promiser outright. `rmdirs` gates directory deletion;
    /// without it, a directory promiser is left alone and reported `Warn`.
    Delete { rmdirs: bool },
}

/// Comparison method. `Atime` is a historical misnomer: it does not
/// read access time at all. It compares ctime and mtime and, if those are
/// ambiguous, falls back to a byte-for-byte binary comparison. The name is
/// kept because promise files already depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompareMethod {
    #[default]
    Mtime,
    Atime,
    Checksum,
    Binary,
    Exists,
}

/// A candidate owner, as one entry of a `Perms::owners` list. The
/// reconciler keeps the current uid if *any* entry in the list matches it
/// (`Same` always matches; `Id`/`Name` match when they resolve to the
/// current uid); otherwise it applies the first entry that isn't
/// `Unknown`. A list made up only of `Unknown` is unresolvable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UidSpec {
    /// Matches whatever the current owner already is.
    Same,
    /// Never matches and is never applied; a placeholder for "anyone but
    /// the listed ones", used to force an explicit-list-or-fail policy.
    Unknown,
    Id(u32),
    Name(String),
}

/// The group-side counterpart of [`UidSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GidSpec {
    Same,
    Unknown,
    Id(u32),
    Name(String),
}

/// One ACL grant. The shape mirrors `user:name:rwx`-style POSIX ACL text
/// entries; this crate carries the data model but has no ACL-capable
/// backend wired up (see [`crate::attributes`]'s `apply_acl`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub subject: String,
    pub permissions: String,
}

/// Owner/group/mode attributes to reconcile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Perms {
    #[serde(default)]
    pub owners: Vec<UidSpec>,
    #[serde(default)]
    pub groups: Vec<GidSpec>,
    pub mode: Option<u32>,
    /// Bits to add on top of whatever mode results (`plus=...`).
    pub plus: Option<u32>,
    /// Bits to clear from whatever mode results (`minus=...`).
    pub minus: Option<u32>,
    /// Force the execute bit on for every read bit a directory ends up
    /// with, after `mode`/`plus`/`minus` are applied.
    #[serde(default)]
    pub rxdirs: bool,
    /// BSD `chflags` bits. Unsupported outside BSD/Darwin; requesting
    /// either of these on an unsupported platform logs and is a no-op.
    pub plus_flags: Option<u32>,
    pub minus_flags: Option<u32>,
    /// Classic Mac OS/HFS+ finder type/creator code. Darwin-only; a no-op
    /// elsewhere.
    pub findertype: Option<String>,
    /// POSIX ACL entries. A no-op everywhere until a platform ACL backend
    /// is wired up.
    #[serde(default)]
    pub acl: Vec<AclEntry>,
}

/// Copy-from another path/host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyFrom {
    pub source: PathBuf,
    /// `None` means local; `Some(host)` routes through [`crate::remote`].
    pub source_host: Option<String>,
    #[serde(default)]
    pub compare: CompareMethod,
    #[serde(default)]
    pub preserve: bool,
    #[serde(default)]
    pub copy_backup: bool,
    #[serde(default)]
    pub link_instead: bool,
    #[serde(default)]
    pub copy_links_matching: Option<String>,
}

/// Link materialization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub target: PathBuf,
    #[serde(default)]
    pub hard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSearch {
    #[serde(default)]
    pub recurse: bool,
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub include_dirs: Vec<String>,
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
    #[serde(default)]
    pub traverse_links: bool,
    #[serde(default)]
    pub xdev: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purge {
    #[serde(default)]
    pub enabled: bool,
    /// An authentication token proving the remote side authorized deletion;
    /// required for purge when `copy_from.source_host` is set.
    pub authenticated_remote: bool,
}

/// What scope of divergence the Integrity step should bother reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportChanges {
    #[default]
    None,
    Content,
    Stats,
    All,
}

/// Controls the content-hash Integrity step that runs after attribute
/// reconciliation, independent of whatever `copy_from.compare` used to
/// decide whether a copy was needed in the first place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub report_changes: ReportChanges,
    #[serde(default)]
    pub hash: HashAlgorithm,
    /// Whether a detected divergence should overwrite HASHDB's recorded
    /// digest. `false` keeps reporting the same divergence on every run
    /// instead of accepting the new content as the new baseline.
    #[serde(default = "default_true")]
    pub update: bool,
    #[serde(default)]
    pub report_diffs: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Change {
    fn default() -> Self {
        Self { report_changes: ReportChanges::default(), hash: HashAlgorithm::default(), update: true, report_diffs: false }
    }
}

/// The full set of attributes a single promiser path is promised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attributes {
    pub create: bool,
    pub type_check: TypeCheck,
    #[serde(default)]
    pub perms: Perms,
    pub copy_from: Option<CopyFrom>,
    pub link: Option<Link>,
    #[serde(default)]
    pub rename: Rename,
    #[serde(default)]
    pub depth_search: Option<DepthSearch>,
    #[serde(default)]
    pub purge: Option<Purge>,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub change: Change,
    pub comment: Option<String>,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            create: false,
            type_check: TypeCheck::Any,
            perms: Perms::default(),
            copy_from: None,
            link: None,
            rename: Rename::default(),
            depth_search: None,
            purge: None,
            action: Action::default(),
            change: Change::default(),
            comment: None,
        }
    }
}

/// A single promise: a promiser path plus its attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promise {
    pub promiser: PathBuf,
    #[serde(flatten)]
    pub attrs: Attributes,
}

impl Promise {
    pub fn new(promiser: impl Into<PathBuf>, attrs: Attributes) -> Self {
        Self {
            promiser: promiser.into(),
            attrs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_attributes_are_noop_shaped() {
        let a = Attributes::default();
        assert!(!a.create);
        assert_eq!(a.type_check, TypeCheck::Any);
        assert_eq!(a.action, Action::Fix);
    }

    #[test]
    fn deserialize_minimal_toml() {
        let toml_src = r#"
            promiser = "/tmp/foo"
            create = true
            type_check = "file"
        "#;
        let p: Promise = toml::from_str(toml_src).unwrap();
        assert_eq!(p.promiser, PathBuf::from("/tmp/foo"));
        assert!(p.attrs.create);
    }
}

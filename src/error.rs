// src/error.rs

//! Crate-wide error type.
//!
//! This is the *exceptional* channel: I/O failures, database failures, and
//! broken invariants that abort a traversal. Ordinary divergence/convergence
//! between promised and actual state is reported through [`crate::outcome::Outcome`],
//! not through `Error` — a `WARN` or a `FAIL` outcome is data, not a Rust error.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Hash(#[from] crate::hash::HashError),

    #[error("path escapes its root: {0}")]
    PathTraversal(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Denied(String),

    #[error("{0}")]
    Fail(String),

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("recursion limit ({limit}) exceeded at {path}", path = .path.display())]
    RecursionLimitExceeded { path: PathBuf, limit: u32 },

    #[error("SERIOUS SECURITY ALERT: symlink race detected at {path}", path = .path.display())]
    SymlinkRace { path: PathBuf },

    #[error("directory identity changed underneath traversal at {path}", path = .path.display())]
    BrokenDirectoryInvariant { path: PathBuf },

    #[error(transparent)]
    Nix(#[from] nix::Error),
}

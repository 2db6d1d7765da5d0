// src/compare.rs

//! C2: Comparison Oracle.
//!
//! Decides whether a promiser's on-disk content matches its `copy_from`
//! source without necessarily touching file content — `Mtime`/`Atime`
//! answer from metadata alone when they can, and only fall back to a real
//! read when metadata is ambiguous.
//!
//! Decision order per promise: EXISTS, then the configured `CompareMethod`,
//! with a size mismatch always short-circuiting to "differs" before any
//! digest is computed. `Checksum` hashes both sides directly and is
//! independent of HASHDB — HASHDB instead backs the separate, out-of-band
//! Integrity step (see [`crate::attributes::check_integrity`]) that compares
//! a file's current content against its own history, not against a copy
//! source.

use crate::hash::{hash_file, HashAlgorithm};
use crate::promise::CompareMethod;
use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Result of comparing a destination against its source or its recorded
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Same,
    Differs,
    /// The destination doesn't exist at all.
    Missing,
}

/// Compare `dest` against `source` using `method`. Every method compares
/// the live destination against the live source; none of them consult or
/// update any persistent history.
pub fn compare(method: CompareMethod, dest: &Path, source: &Path) -> io::Result<Comparison> {
    let dest_meta = match fs::symlink_metadata(dest) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Comparison::Missing),
        Err(e) => return Err(e),
    };

    if method == CompareMethod::Exists {
        return Ok(Comparison::Same);
    }

    let source_meta = fs::symlink_metadata(source)?;

    // Size mismatch is always conclusive for regular files, independent of
    // which comparator was requested.
    if dest_meta.is_file() && source_meta.is_file() && dest_meta.len() != source_meta.len() {
        return Ok(Comparison::Differs);
    }

    match method {
        CompareMethod::Exists => unreachable!("handled above"),
        CompareMethod::Mtime => {
            if dest_meta.mtime() >= source_meta.mtime() {
                Ok(Comparison::Same)
            } else {
                Ok(Comparison::Differs)
            }
        }
        CompareMethod::Atime => {
            // Historical misnomer: never reads st_atime. ctime/mtime first;
            // if both match, fall back to a binary compare to be sure.
            if dest_meta.ctime() == source_meta.ctime() && dest_meta.mtime() == source_meta.mtime() {
                Ok(Comparison::Same)
            } else {
                binary_compare(dest, source)
            }
        }
        CompareMethod::Binary => binary_compare(dest, source),
        CompareMethod::Checksum => {
            if dest_meta.is_file() && source_meta.is_file() {
                let dest_digest =
                    hash_file(HashAlgorithm::Sha256, dest).map_err(|e| io::Error::other(e.to_string()))?;
                let source_digest =
                    hash_file(HashAlgorithm::Sha256, source).map_err(|e| io::Error::other(e.to_string()))?;
                Ok(if dest_digest.as_str() == source_digest.as_str() { Comparison::Same } else { Comparison::Differs })
            } else if dest_meta.ctime() < source_meta.ctime() || dest_meta.mtime() < source_meta.mtime() {
                Ok(Comparison::Differs)
            } else {
                Ok(Comparison::Same)
            }
        }
    }
}

fn binary_compare(dest: &Path, source: &Path) -> io::Result<Comparison> {
    let mut a = fs::File::open(dest)?;
    let mut b = fs::File::open(source)?;
    let mut buf_a = [0u8; 64 * 1024];
    let mut buf_b = [0u8; 64 * 1024];
    loop {
        let na = a.read(&mut buf_a)?;
        let nb = b.read(&mut buf_b)?;
        if na != nb || buf_a[..na] != buf_b[..nb] {
            return Ok(Comparison::Differs);
        }
        if na == 0 {
            return Ok(Comparison::Same);
        }
    }
}

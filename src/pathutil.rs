// src/pathutil.rs

//! Path sanitization shared by the copy engine, traversal engine, and name
//! reconciler.
//!
//! Every path that ends up in a filesystem call on this crate's behalf is
//! either promiser-controlled (trusted, comes from the caller's own promise)
//! or destination-relative (untrusted in the sense that a `..` component
//! would let a promise escape its own root). These helpers guard the latter.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Normalize a path: strip leading slashes, drop `.` components, reject `..`.
///
/// # Examples
///
/// ```
/// use convergefs::pathutil::sanitize_path;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_path("usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
/// assert_eq!(sanitize_path("/usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
/// assert!(sanitize_path("../etc/passwd").is_err());
/// ```
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();
    let relative = path_str.trim_start_matches('/');

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(path_str.to_string()));
            }
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath("empty path after sanitization".to_string()));
    }

    Ok(normalized)
}

/// Join `root` with an untrusted relative path, refusing any result that
/// would escape `root`.
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let sanitized = sanitize_path(path.as_ref())?;
    let joined = root.join(&sanitized);

    if let (Ok(canonical_root), Ok(canonical_joined)) = (root.canonicalize(), joined.canonicalize())
        && !canonical_joined.starts_with(&canonical_root)
    {
        return Err(Error::PathTraversal(format!(
            "path {} escapes root {}",
            joined.display(),
            root.display()
        )));
    }

    Ok(joined)
}

/// Sanitize a single filename component, rejecting any path separator.
pub fn sanitize_filename(name: &str) -> Result<String> {
    if name.contains('/') || name.contains('\\') {
        return Err(Error::PathTraversal(format!(
            "filename contains path separator: {name}"
        )));
    }
    if name == ".." || name == "." {
        return Err(Error::PathTraversal(format!("invalid filename: {name}")));
    }
    if name.is_empty() {
        return Err(Error::InvalidPath("empty filename".to_string()));
    }
    Ok(name.to_string())
}

/// Identity of a directory for the symlink-race defense: compared before
/// and after a directory descent to detect a swap underneath us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirIdentity {
    pub dev: u64,
    pub ino: u64,
}

impl DirIdentity {
    pub fn of(path: &Path) -> Result<Self> {
        use std::os::unix::fs::MetadataExt;
        let meta = std::fs::symlink_metadata(path)?;
        Ok(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_path_normal() {
        assert_eq!(sanitize_path("usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
        assert_eq!(sanitize_path("usr/lib/libfoo.so").unwrap(), PathBuf::from("usr/lib/libfoo.so"));
    }

    #[test]
    fn sanitize_path_leading_slash() {
        assert_eq!(sanitize_path("/usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
        assert_eq!(sanitize_path("///usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
    }

    #[test]
    fn sanitize_path_dot() {
        assert_eq!(sanitize_path("./usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
        assert_eq!(sanitize_path("usr/./bin/./foo").unwrap(), PathBuf::from("usr/bin/foo"));
    }

    #[test]
    fn sanitize_path_traversal_rejected() {
        assert!(sanitize_path("..").is_err());
        assert!(sanitize_path("../etc/passwd").is_err());
        assert!(sanitize_path("usr/../../../etc/passwd").is_err());
    }

    #[test]
    fn sanitize_path_empty_rejected() {
        assert!(sanitize_path("").is_err());
        assert!(sanitize_path("/").is_err());
        assert!(sanitize_path("./").is_err());
    }

    #[test]
    fn safe_join_normal() {
        let root = PathBuf::from("/tmp/convergefs-test");
        assert_eq!(safe_join(&root, "usr/bin/foo").unwrap(), PathBuf::from("/tmp/convergefs-test/usr/bin/foo"));
    }

    #[test]
    fn safe_join_traversal_rejected() {
        let root = PathBuf::from("/tmp/convergefs-test");
        assert!(safe_join(&root, "../etc/passwd").is_err());
    }

    #[test]
    fn sanitize_filename_rejects_separators() {
        assert_eq!(sanitize_filename("file.txt").unwrap(), "file.txt");
        assert!(sanitize_filename("sub/file.txt").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("").is_err());
    }
}

// src/remote.rs

//! Remote transport contract, consumed only.
//!
//! The engine never implements a wire protocol itself — a real remote
//! transport implementation is out of scope. What it does need is a seam
//! a caller can plug a real transport into for `copy_from.source_host`
//! promises, and a way to assert that a purge against a remote source was
//! authenticated.

use std::io;
use std::path::Path;

/// What a remote transport must provide for the copy engine to treat a
/// `copy_from.source_host` promise the same way it treats a local one.
pub trait RemoteSource {
    /// Fetch `remote_path`'s content into `local_staging`, returning once
    /// the data is durably on disk at the staging path.
    fn fetch(&self, remote_path: &Path, local_staging: &Path) -> io::Result<()>;

    /// Stat a remote path without fetching its content, used by the
    /// comparison oracle's metadata-only methods.
    fn stat(&self, remote_path: &Path) -> io::Result<RemoteStat>;

    /// `true` once this transport has completed its own authentication
    /// handshake; gates whether a remote-sourced purge is allowed to run.
    fn is_authenticated(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct RemoteStat {
    pub size: u64,
    pub mtime: i64,
}

/// A `RemoteSource` that always fails; used as the default when a promise
/// names a `source_host` but the caller hasn't wired in a real transport.
pub struct UnconfiguredRemote;

impl RemoteSource for UnconfiguredRemote {
    fn fetch(&self, _remote_path: &Path, _local_staging: &Path) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "no remote transport configured"))
    }

    fn stat(&self, _remote_path: &Path) -> io::Result<RemoteStat> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "no remote transport configured"))
    }

    fn is_authenticated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_remote_refuses_everything() {
        let remote = UnconfiguredRemote;
        assert!(!remote.is_authenticated());
        assert!(remote.fetch(Path::new("/a"), Path::new("/b")).is_err());
        assert!(remote.stat(Path::new("/a")).is_err());
    }
}

// src/state.rs

//! Process-wide agent state.
//!
//! A handful of pieces of mutable state are shared across every promise
//! evaluated in one process run and need the same protection any shared
//! connection-like state does: a `Mutex` around a plain struct, opened
//! once per run and passed down by reference.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

/// Shared mutable state for one engine run.
#[derive(Debug, Default)]
pub struct AgentState {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Sources already copied once this run, so a `copy_from` reused by
    /// multiple promises in the same run is fetched only once.
    single_copy_cache: HashSet<PathBuf>,
    /// Root-owned setuid/setgid files flagged this run, so the one-shot
    /// security alert fires only once per path even if the same promise
    /// is re-evaluated.
    setuid_watchlist: HashSet<PathBuf>,
    /// Paths that were auto-defined (parent directories created to satisfy
    /// `create = true`), tracked so a later purge pass doesn't remove a
    /// directory this run itself created moments earlier.
    auto_define_registry: HashSet<PathBuf>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `path` had not already been recorded as copied,
    /// and records it.
    pub fn mark_single_copy(&self, path: &std::path::Path) -> bool {
        let mut inner = self.inner.lock().expect("AgentState mutex poisoned");
        inner.single_copy_cache.insert(path.to_path_buf())
    }

    pub fn was_single_copied(&self, path: &std::path::Path) -> bool {
        let inner = self.inner.lock().expect("AgentState mutex poisoned");
        inner.single_copy_cache.contains(path)
    }

    /// Returns `true` if this is the first time `path` has been flagged as a
    /// root-owned setuid/setgid file this run.
    pub fn flag_setuid_once(&self, path: &std::path::Path) -> bool {
        let mut inner = self.inner.lock().expect("AgentState mutex poisoned");
        inner.setuid_watchlist.insert(path.to_path_buf())
    }

    pub fn mark_auto_defined(&self, path: &std::path::Path) {
        let mut inner = self.inner.lock().expect("AgentState mutex poisoned");
        inner.auto_define_registry.insert(path.to_path_buf());
    }

    pub fn was_auto_defined(&self, path: &std::path::Path) -> bool {
        let inner = self.inner.lock().expect("AgentState mutex poisoned");
        inner.auto_define_registry.contains(path)
    }
}

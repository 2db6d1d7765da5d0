// src/hashdb.rs

//! C1: Hash Oracle (persistence half) — `HASHDB`, keyed by `(algorithm, path)`.
//!
//! A migration-guarded `Connection`, opened on demand with its schema
//! brought up to date on open, and one `Mutex<Connection>` behind the
//! handle so concurrent promise evaluations in the same process serialize
//! their writes rather than racing SQLite's own locking.
//!
//! Older convergent-state tools padded the algorithm name to a fixed field
//! width before concatenating it with the path into one on-disk key. That
//! padding was an artifact of the flat B-tree databases those tools used,
//! not a semantic requirement — lookup/insert/delete are at most one digest
//! per `(algorithm, path)`, delete-then-insert on update. A SQLite composite
//! primary key gives us that directly, so this is a deliberate
//! modernization, not a behavior change.

use crate::error::Result;
use crate::hash::HashAlgorithm;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

pub struct HashDb {
    conn: Mutex<Connection>,
}

impl HashDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Look up the last digest recorded for `(algorithm, path)`.
    pub fn lookup(&self, algorithm: HashAlgorithm, path: &Path) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("HashDb mutex poisoned");
        let path_str = path.to_string_lossy();
        let value: Option<String> = conn
            .query_row(
                "SELECT digest FROM hashdb WHERE algorithm = ?1 AND path = ?2",
                params![algorithm.name(), path_str],
                |row| row.get(0),
            )
            .ok();
        Ok(value)
    }

    /// Replace the recorded digest for `(algorithm, path)` (delete-then-insert).
    pub fn store(&self, algorithm: HashAlgorithm, path: &Path, digest: &str) -> Result<()> {
        let conn = self.conn.lock().expect("HashDb mutex poisoned");
        let path_str = path.to_string_lossy();
        conn.execute(
            "DELETE FROM hashdb WHERE algorithm = ?1 AND path = ?2",
            params![algorithm.name(), path_str],
        )?;
        conn.execute(
            "INSERT INTO hashdb (algorithm, path, digest, recorded_at) VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)",
            params![algorithm.name(), path_str, digest],
        )?;
        debug!(path = %path_str, algorithm = %algorithm, "recorded hash");
        Ok(())
    }

    /// Drop every record for `path` regardless of algorithm, used by rename
    /// and purge to avoid stale HASHDB entries pointing at a path that no
    /// longer refers to the same content.
    pub fn purge_path(&self, path: &Path) -> Result<()> {
        let conn = self.conn.lock().expect("HashDb mutex poisoned");
        let path_str = path.to_string_lossy();
        conn.execute("DELETE FROM hashdb WHERE path = ?1", params![path_str])?;
        Ok(())
    }

    /// Compare `fresh_digest` against the recorded one for `(algorithm,
    /// path)`. A first-ever observation always records a baseline and
    /// reports [`HashComparison::New`]; a later divergence only overwrites
    /// that baseline when `update` is true — otherwise the same divergence
    /// keeps being reported on every subsequent call, per `change.update`.
    pub fn file_hash_changed(
        &self,
        algorithm: HashAlgorithm,
        path: &Path,
        fresh_digest: &str,
        update: bool,
    ) -> Result<HashComparison> {
        match self.lookup(algorithm, path)? {
            None => {
                self.store(algorithm, path, fresh_digest)?;
                Ok(HashComparison::New)
            }
            Some(previous) if previous == fresh_digest => Ok(HashComparison::Unchanged),
            Some(_) => {
                if update {
                    self.store(algorithm, path, fresh_digest)?;
                }
                Ok(HashComparison::Changed)
            }
        }
    }
}

/// Result of comparing a freshly computed digest against HASHDB's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashComparison {
    /// No prior record existed; the fresh digest was recorded as the
    /// baseline.
    New,
    Unchanged,
    Changed,
}

const SCHEMA_VERSION: i32 = 1;

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )?;

    let current: i32 = conn
        .query_row("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1", [], |r| r.get(0))
        .unwrap_or(0);

    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        "CREATE TABLE hashdb (
            algorithm TEXT NOT NULL,
            path TEXT NOT NULL,
            digest TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (algorithm, path)
        );
        CREATE INDEX idx_hashdb_path ON hashdb(path);",
    )?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", params![SCHEMA_VERSION])?;
    Ok(())
}

// src/statsdb.rs

//! C3 Attribute Reconciler (persistence half) — the `filestats` database,
//! keyed by `path`, recording the last-observed `{mode, uid, gid, dev, ino,
//! mtime}` snapshot so the attribute reconciler's out-of-band change
//! detection has a prior state to diff the live `stat(2)` result against.

use crate::error::Result;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub dev: u64,
    pub ino: u64,
    pub mtime: i64,
}

pub struct StatsDb {
    conn: Mutex<Connection>,
}

impl StatsDb {
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

    pub fn lookup(&self, path: &Path) -> Result<Option<FileStat>> {
        let conn = self.conn.lock().expect("StatsDb mutex poisoned");
        let path_str = path.to_string_lossy();
        let row = conn
            .query_row(
                "SELECT mode, uid, gid, dev, ino, mtime FROM filestats WHERE path = ?1",
                params![path_str],
                |r| {
                    Ok(FileStat {
                        mode: r.get::<_, i64>(0)? as u32,
                        uid: r.get::<_, i64>(1)? as u32,
                        gid: r.get::<_, i64>(2)? as u32,
                        dev: r.get::<_, i64>(3)? as u64,
                        ino: r.get::<_, i64>(4)? as u64,
                        mtime: r.get(5)?,
                    })
                },
            )
            .ok();
        Ok(row)
    }

    pub fn store(&self, path: &Path, stat: &FileStat) -> Result<()> {
        let conn = self.conn.lock().expect("StatsDb mutex poisoned");
        let path_str = path.to_string_lossy();
        conn.execute(
            "INSERT INTO filestats (path, mode, uid, gid, dev, ino, mtime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(path) DO UPDATE SET mode = excluded.mode, uid = excluded.uid, gid = excluded.gid,
                dev = excluded.dev, ino = excluded.ino, mtime = excluded.mtime",
            params![
                path_str,
                stat.mode as i64,
                stat.uid as i64,
                stat.gid as i64,
                stat.dev as i64,
                stat.ino as i64,
                stat.mtime,
            ],
        )?;
        Ok(())
    }

    pub fn purge_path(&self, path: &Path) -> Result<()> {
        let conn = self.conn.lock().expect("StatsDb mutex poisoned");
        conn.execute("DELETE FROM filestats WHERE path = ?1", params![path.to_string_lossy()])?;
        Ok(())
    }
}

const SCHEMA_VERSION: i32 = 2;

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
        "DROP TABLE IF EXISTS filestats;
        CREATE TABLE filestats (
            path TEXT PRIMARY KEY,
            mode INTEGER NOT NULL,
            uid INTEGER NOT NULL,
            gid INTEGER NOT NULL,
            dev INTEGER NOT NULL,
            ino INTEGER NOT NULL,
            mtime INTEGER NOT NULL
        );",
    )?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", params![SCHEMA_VERSION])?;
    Ok(())
}

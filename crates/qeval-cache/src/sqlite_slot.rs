//! Durable key-value slot backed by SQLite.
//!
//! One row per cache namespace blob. The byte quota plays the role of
//! the browser storage budget: a write that would push the sum of
//! stored value bytes past the quota fails with
//! [`SlotError::QuotaExceeded`] and leaves the slot unchanged, so the
//! cache store can run its eviction ladder and retry.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::slot::{KvSlot, SlotError, SlotResult};

pub struct SqliteSlot {
    conn: Connection,
    quota_bytes: Option<u64>,
}

fn init_db(conn: &Connection) -> SlotResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| SlotError::Unavailable(e.to_string()))
}

impl SqliteSlot {
    pub fn new(path: &Path, quota_bytes: Option<u64>) -> SlotResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SlotError::Unavailable(format!("cannot create cache dir: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| SlotError::Unavailable(format!("cannot open cache db: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| SlotError::Unavailable(e.to_string()))?;
        init_db(&conn)?;
        Ok(Self { conn, quota_bytes })
    }

    pub fn in_memory(quota_bytes: Option<u64>) -> SlotResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SlotError::Unavailable(format!("cannot open in-memory db: {e}")))?;
        init_db(&conn)?;
        Ok(Self { conn, quota_bytes })
    }

    fn used_bytes_excluding(&self, key: &str) -> SlotResult<u64> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0) FROM kv WHERE key != ?1",
                params![key],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(|e| SlotError::Unavailable(e.to_string()))
    }
}

impl KvSlot for SqliteSlot {
    fn get(&self, key: &str) -> SlotResult<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|e| SlotError::Unavailable(e.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> SlotResult<()> {
        if let Some(quota) = self.quota_bytes {
            if self.used_bytes_excluding(key)? + value.len() as u64 > quota {
                return Err(SlotError::QuotaExceeded);
            }
        }
        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| SlotError::Unavailable(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> SlotResult<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| SlotError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

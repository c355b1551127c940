//! Database connection and operations

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;
use crate::migrations::run_migrations;
use crate::Result;

/// A settings value together with its optimistic-concurrency version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: String,
    pub version: i64,
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for better concurrent performance
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_value(key)?.map(|v| v.value))
    }

    /// Unconditional write; bumps the version
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.save_value(key, value, None)?;
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<Option<VersionedValue>> {
        self.with_connection(|conn| {
            let value = conn
                .query_row(
                    "SELECT value, version FROM settings WHERE key = ?1",
                    [key],
                    |row| {
                        Ok(VersionedValue {
                            value: row.get(0)?,
                            version: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(value)
        })
    }

    /// Write `value` under `key` if the stored version still equals
    /// `expected_version` (`0` meaning "not yet stored"). `None` skips the
    /// check. Returns the new version.
    pub fn save_value(&self, key: &str, value: &str, expected_version: Option<i64>) -> Result<i64> {
        let updated_at = Utc::now().to_rfc3339();
        self.transaction(|conn| {
            let actual: i64 = conn
                .query_row("SELECT version FROM settings WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?
                .unwrap_or(0);

            if let Some(expected) = expected_version {
                if expected != actual {
                    return Err(StorageError::VersionConflict {
                        key: key.to_string(),
                        expected,
                        actual,
                    });
                }
            }

            let next = actual + 1;
            conn.execute(
                "INSERT OR REPLACE INTO settings (key, value, version, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![key, value, next, updated_at],
            )?;
            Ok(next)
        })
    }

    /// Current on-disk size in bytes (page count times page size)
    pub fn size_bytes(&self) -> Result<u64> {
        self.with_connection(|conn| {
            let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
            Ok((pages * page_size).max(0) as u64)
        })
    }

    pub fn vacuum(&self) -> Result<u64> {
        self.with_connection(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(())
        })?;
        self.size_bytes()
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

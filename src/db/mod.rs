//! Transaction Store: a single-file embedded relational store.
//!
//! Holds the open connection and the exchange-rate mode decided at creation
//! time. Schema creation is idempotent; opening enforces the forward-only
//! version contract.

mod migrations;

use crate::error::{EngineError, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateMode {
    Daily,
    Annual,
}

impl RateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateMode::Daily => "daily",
            RateMode::Annual => "annual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(RateMode::Daily),
            "annual" => Some(RateMode::Annual),
            _ => None,
        }
    }
}

const EXCHANGE_RATE_MODE_KEY: &str = "exchange_rate_mode";

/// Owns the database connection and path. `conn` is `None` when no store is open.
pub struct Store {
    conn: Mutex<Option<Connection>>,
    path: Mutex<Option<PathBuf>>,
}

impl Store {
    /// Construct a not-yet-open store handle.
    pub fn new() -> Self {
        Self {
            conn: Mutex::new(None),
            path: Mutex::new(None),
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().unwrap().is_some()
    }

    /// Create a brand-new store file with the given rate mode, idempotently
    /// creating schema and recording the initial version row.
    pub fn create(&self, path: PathBuf, mode: RateMode) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations::run_migrations(&conn)?;

        conn.execute(
            "INSERT INTO versions (version, timestamp, description) VALUES (?1, strftime('%s','now'), ?2)",
            rusqlite::params![migrations::CURRENT_VERSION, "initial schema"],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            rusqlite::params![EXCHANGE_RATE_MODE_KEY, mode.as_str()],
        )?;

        *self.conn.lock().unwrap() = Some(conn);
        *self.path.lock().unwrap() = Some(path);
        log::info!("created store in {} rate mode", mode.as_str());
        Ok(())
    }

    /// Open an existing store file, verifying it is not newer than the
    /// version this implementation understands.
    pub fn open(&self, path: PathBuf) -> Result<()> {
        let conn = Connection::open(&path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations::run_migrations(&conn)?;

        let found_version: Option<i64> = conn
            .query_row(
                "SELECT version FROM versions ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();

        if let Some(found) = found_version {
            if found > migrations::CURRENT_VERSION {
                return Err(EngineError::SchemaTooNew {
                    found,
                    supported: migrations::CURRENT_VERSION,
                });
            }
        }

        *self.conn.lock().unwrap() = Some(conn);
        *self.path.lock().unwrap() = Some(path);
        Ok(())
    }

    /// Close the connection. The path is cleared; the store can be reopened
    /// with `open`/`create`.
    pub fn close(&self) {
        *self.conn.lock().unwrap() = None;
        *self.path.lock().unwrap() = None;
    }

    pub fn get_path(&self) -> Option<PathBuf> {
        self.path.lock().unwrap().clone()
    }

    /// Run a closure against the open connection, or fail with `NoDatabaseOpen`.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or(EngineError::NoDatabaseOpen)?;
        f(conn)
    }

    /// Run a closure against the open connection with exclusive access, or
    /// fail with `NoDatabaseOpen`. Used for operations that need a
    /// transaction spanning multiple statements.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut guard = self.conn.lock().unwrap();
        let conn = guard.as_mut().ok_or(EngineError::NoDatabaseOpen)?;
        f(conn)
    }

    /// Read the persisted exchange-rate mode.
    pub fn rate_mode(&self) -> Result<RateMode> {
        self.with_conn(|conn| {
            let value: String = conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                [EXCHANGE_RATE_MODE_KEY],
                |row| row.get(0),
            )?;
            RateMode::parse(&value).ok_or_else(|| {
                EngineError::InvalidInput(format!("unrecognized rate mode in settings: {value}"))
            })
        })
    }

    /// Atomically clone the whole store to a new file and switch the active
    /// handle to the clone. Uses SQLite's backup API so concurrent readers in
    /// this process observe a consistent snapshot, then reopens at the new path.
    pub fn save_as(&self, new_path: &Path) -> Result<()> {
        let mut guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or(EngineError::NoDatabaseOpen)?;

        let mut dest = Connection::open(new_path)?;
        {
            let backup = rusqlite::backup::Backup::new(conn, &mut dest)?;
            backup.run_to_completion(5, std::time::Duration::from_millis(10), None)?;
        }
        dest.execute("PRAGMA foreign_keys = ON", [])?;

        *guard = Some(dest);
        drop(guard);
        *self.path.lock().unwrap() = Some(new_path.to_path_buf());
        log::info!("saved store to {:?}", new_path);
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

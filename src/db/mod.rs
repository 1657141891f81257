//! SQLite-backed lead record store.
//!
//! The database lives at `~/.rocketlead/rocketlead.db` unless the config
//! overrides it. It holds the reconciled `leads` table, the derived
//! `agent_sales` counters and a `scan_runs` log. One writer connection
//! serializes upserts; readers open a second, read-only connection and see
//! WAL snapshots without waiting on the writer.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags};

pub mod types;
pub use types::*;

/// Render a timestamp the way every table stores it.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp. Accepts any RFC 3339 offset.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub struct LeadDb {
    conn: Connection,
}

impl LeadDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default location and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path, creating it and running migrations.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL lets the read-only connection keep serving dashboards mid-scan
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        Ok(Self { conn })
    }

    /// Open a database at an explicit path in read-only mode. The schema must
    /// already exist (open a writer first).
    pub fn open_readonly_at(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.rocketlead/rocketlead.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".rocketlead").join("rocketlead.db"))
    }
}

pub mod agents;
pub mod leads;
pub mod scans;

// =============================================================================
// Shared test utilities
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use super::LeadDb;

    /// Create a temporary database for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of the test.
    /// Test temp dirs are cleaned up by the OS.
    pub fn test_db() -> LeadDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        LeadDb::open_at(path).expect("Failed to open test database")
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Database module for the email journal.
//!
//! One SQLite file holds the outbound journal, confirmation requests,
//! orphan replies and the processed-message ledger. Repositories are
//! free functions over a [`Database`] handle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as TimeDelta, SecondsFormat, Utc};
use rusqlite::Connection;

pub mod error;
pub mod migrations;
pub mod orphan_repo;
pub mod outbound_repo;
pub mod processed_repo;
pub mod reply_store;
pub mod request_repo;
pub mod stats_repo;

pub use error::DatabaseError;

/// Shared handle to the email journal.
///
/// Clones share one connection behind a `Mutex`; callers never hold the
/// lock across an await.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Lock wait before SQLite reports `SQLITE_BUSY` to another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl Database {
    /// Opens (or creates) the journal at `path`, creating parent
    /// directories, and migrates it.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self::prepare(conn)?;

        log::info!("Email journal opened at {}", path.display());
        Ok(db)
    }

    /// Opens a private in-memory journal, fully migrated.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DatabaseError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// Returns the canonical database path: `~/.balance-beacon/data/beacon.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".balance-beacon").join("data").join("beacon.db"))
}

/// Formats a timestamp the way every table stores it.
///
/// Fixed-width UTC with milliseconds, so text ordering equals time ordering.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `days` days before `now`, clamped to the earliest representable instant.
pub fn days_before(now: &DateTime<Utc>, days: i64) -> DateTime<Utc> {
    TimeDelta::try_days(days)
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Parses a stored timestamp column.
pub fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidValue {
            column,
            reason: format!("'{}': {}", value, e),
        })
}

/// Parses an optional stored timestamp column.
pub fn parse_optional_timestamp(
    column: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.map(|v| parse_timestamp(column, v)).transpose()
}

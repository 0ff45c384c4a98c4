//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::UnknownVariant;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// A row addressed by id does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// An orphan reply was already closed by an operator.
    #[error("Orphan reply {0} has already been processed")]
    OrphanAlreadyProcessed(i64),

    /// A stored column could not be decoded.
    #[error("Invalid value in column '{column}': {reason}")]
    InvalidValue { column: &'static str, reason: String },
}

impl From<UnknownVariant> for DatabaseError {
    fn from(err: UnknownVariant) -> Self {
        DatabaseError::InvalidValue {
            column: err.kind,
            reason: err.to_string(),
        }
    }
}

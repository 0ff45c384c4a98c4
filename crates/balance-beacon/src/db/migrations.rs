//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order. ADD COLUMN migrations are handled
//! conditionally so a partially upgraded database can be re-run.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    /// Execute the SQL directly.
    Standard,
    /// ALTER TABLE ADD COLUMN; skip if column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_confirmation_requests_table",
        sql: include_str!("sql/001_create_confirmation_requests.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_outbound_emails_table",
        sql: include_str!("sql/002_create_outbound_emails.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create_orphan_replies_table",
        sql: include_str!("sql/003_create_orphan_replies.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "create_processed_messages_table",
        sql: include_str!("sql/004_create_processed_messages.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 5,
        description: "add_priority_level_to_outbound_emails",
        sql: include_str!("sql/005_add_priority_level.sql"),
        kind: MigrationKind::AddColumn {
            table: "outbound_emails",
            column: "priority_level",
        },
    },
];

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

/// Brings the journal schema up to date. Each pending migration is applied
/// and recorded in one transaction.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(CREATE_LEDGER)?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        log::debug!("Journal schema at v{}, nothing to migrate", applied);
        return Ok(());
    }

    for migration in pending {
        apply(conn, migration)?;
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;
    let needed = match &migration.kind {
        MigrationKind::Standard => true,
        MigrationKind::AddColumn { table, column } => !column_exists(&tx, table, column)?,
    };

    if needed {
        log::info!("Applying migration v{} ({})", migration.version, migration.description);
        tx.execute_batch(migration.sql).map_err(failed)?;
    } else {
        log::info!(
            "Recording migration v{} without running it, column already present",
            migration.version
        );
    }

    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    // Identifiers are interpolated, so only alphanumerics and underscores.
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

//! Processed message ledger: inbound message-ids whose reply was applied.

use chrono::Utc;
use rusqlite::params;

use super::{format_timestamp, Database, DatabaseError};

/// Where an applied inbound message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedOutcome {
    /// Correlated with an outbound email.
    Matched { outbound_email_id: String },
    /// Filed as an orphan.
    Orphaned { orphan_id: i64 },
}

impl ProcessedOutcome {
    fn label(&self) -> &'static str {
        match self {
            ProcessedOutcome::Matched { .. } => "matched",
            ProcessedOutcome::Orphaned { .. } => "orphaned",
        }
    }
}

/// Records that a message-id has been applied. Recording twice is a no-op.
pub fn insert(
    db: &Database,
    message_id: &str,
    outcome: &ProcessedOutcome,
) -> Result<(), DatabaseError> {
    let (outbound_email_id, orphan_id) = match outcome {
        ProcessedOutcome::Matched { outbound_email_id } => (Some(outbound_email_id.as_str()), None),
        ProcessedOutcome::Orphaned { orphan_id } => (None, Some(*orphan_id)),
    };

    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO processed_messages
             (message_id, outcome, outbound_email_id, orphan_id, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message_id,
                outcome.label(),
                outbound_email_id,
                orphan_id,
                format_timestamp(&Utc::now()),
            ],
        )?;
        Ok(())
    })
}

/// Checks whether a message-id has already been applied.
pub fn contains(db: &Database, message_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM processed_messages WHERE message_id = ?1",
            params![message_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Counts ledger entries.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM processed_messages", [], |r| r.get(0))?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_insert_and_contains() {
        let db = test_db();
        assert!(!contains(&db, "<a@x>").unwrap());

        insert(
            &db,
            "<a@x>",
            &ProcessedOutcome::Matched {
                outbound_email_id: "e1".to_string(),
            },
        )
        .unwrap();
        assert!(contains(&db, "<a@x>").unwrap());
        assert!(!contains(&db, "<b@x>").unwrap());
    }

    #[test]
    fn test_insert_duplicate_is_ignored() {
        let db = test_db();
        let outcome = ProcessedOutcome::Orphaned { orphan_id: 7 };
        insert(&db, "<a@x>", &outcome).unwrap();
        insert(&db, "<a@x>", &outcome).unwrap();
        assert_eq!(count(&db).unwrap(), 1);
    }
}

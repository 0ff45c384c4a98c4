//! Orphan reply repository: replies nobody could correlate.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::{NewOrphanReply, OrphanReply, OrphanResolution};

const SELECT_COLUMNS: &str = "id, message_id, from_address, subject, content, received_at,
     in_reply_to, created_at, is_processed, processed_at, processed_by,
     linked_to_email_id, processing_notes";

/// A raw orphan row from the database.
#[derive(Debug, Clone)]
struct OrphanRow {
    id: i64,
    message_id: Option<String>,
    from_address: String,
    subject: String,
    content: String,
    received_at: String,
    in_reply_to: Option<String>,
    created_at: String,
    is_processed: bool,
    processed_at: Option<String>,
    processed_by: Option<String>,
    linked_to_email_id: Option<String>,
    processing_notes: Option<String>,
}

impl OrphanRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            message_id: row.get(1)?,
            from_address: row.get(2)?,
            subject: row.get(3)?,
            content: row.get(4)?,
            received_at: row.get(5)?,
            in_reply_to: row.get(6)?,
            created_at: row.get(7)?,
            is_processed: row.get(8)?,
            processed_at: row.get(9)?,
            processed_by: row.get(10)?,
            linked_to_email_id: row.get(11)?,
            processing_notes: row.get(12)?,
        })
    }

    fn into_model(self) -> Result<OrphanReply, DatabaseError> {
        Ok(OrphanReply {
            id: self.id,
            message_id: self.message_id,
            from_address: self.from_address,
            subject: self.subject,
            content: self.content,
            received_at: parse_timestamp("received_at", &self.received_at)?,
            in_reply_to: self.in_reply_to,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            processed: self.is_processed,
            processed_at: parse_optional_timestamp("processed_at", self.processed_at.as_deref())?,
            processed_by: self.processed_by,
            linked_to_email_id: self.linked_to_email_id,
            processing_notes: self.processing_notes,
        })
    }
}

/// One page of unprocessed orphans.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanPage {
    pub data: Vec<OrphanReply>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// Files an unmatched reply. Returns the new orphan id.
pub fn insert(db: &Database, orphan: &NewOrphanReply) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO orphan_replies (message_id, from_address, subject, content,
             received_at, in_reply_to, created_at, is_processed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                orphan.message_id,
                orphan.from_address,
                orphan.subject,
                orphan.content,
                format_timestamp(&orphan.received_at),
                orphan.in_reply_to,
                format_timestamp(&Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Loads one orphan by id.
pub fn get(db: &Database, id: i64) -> Result<Option<OrphanReply>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM orphan_replies WHERE id = ?1", SELECT_COLUMNS);
        Ok(conn.query_row(&sql, params![id], OrphanRow::from_row).optional()?)
    })?;
    row.map(OrphanRow::into_model).transpose()
}

/// Lists unprocessed orphans, newest received first.
pub fn list_unprocessed(db: &Database, limit: u32, offset: u32) -> Result<OrphanPage, DatabaseError> {
    let (rows, total) = db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM orphan_replies WHERE is_processed = 0
             ORDER BY received_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit, offset], OrphanRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM orphan_replies WHERE is_processed = 0",
            [],
            |r| r.get(0),
        )?;
        Ok((rows, total))
    })?;

    Ok(OrphanPage {
        data: rows
            .into_iter()
            .map(OrphanRow::into_model)
            .collect::<Result<Vec<_>, _>>()?,
        total,
        limit,
        offset,
    })
}

/// Closes an orphan after manual review. Succeeds exactly once per orphan.
pub fn mark_processed(
    db: &Database,
    id: i64,
    resolution: &OrphanResolution,
    processed_by: &str,
    processed_at: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE orphan_replies
             SET is_processed = 1,
                 processed_at = ?1,
                 processed_by = ?2,
                 linked_to_email_id = ?3,
                 processing_notes = ?4
             WHERE id = ?5 AND is_processed = 0",
            params![
                format_timestamp(processed_at),
                processed_by,
                resolution.linked_to_email_id,
                resolution.processing_notes,
                id,
            ],
        )?;
        if changed > 0 {
            return Ok(());
        }

        let exists: Option<bool> = conn
            .query_row(
                "SELECT is_processed FROM orphan_replies WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Err(DatabaseError::OrphanAlreadyProcessed(id)),
            None => Err(DatabaseError::NotFound {
                entity: "orphan reply",
                id: id.to_string(),
            }),
        }
    })
}

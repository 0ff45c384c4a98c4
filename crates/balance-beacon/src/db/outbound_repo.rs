//! Outbound email repository: the `outbound_emails` journal table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::{
    NewOutboundEmail, OutboundEmailRecord, ReplyClassification, ReplyStatus, ReplyUpdate,
    SendStatus,
};

const SELECT_COLUMNS: &str = "id, recipient_address, recipient_name, subject, body, category,
     status, provider_message_id, sent_at, confirmation_request_id,
     replied_at, reply_body, reply_classification, reply_status";

/// A raw outbound email row from the database.
#[derive(Debug, Clone)]
pub struct OutboundEmailRow {
    pub id: String,
    pub recipient_address: String,
    pub recipient_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub category: String,
    pub status: String,
    pub provider_message_id: Option<String>,
    pub sent_at: String,
    pub confirmation_request_id: Option<String>,
    pub replied_at: Option<String>,
    pub reply_body: Option<String>,
    pub reply_classification: Option<String>,
    pub reply_status: Option<String>,
}

impl OutboundEmailRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            recipient_address: row.get(1)?,
            recipient_name: row.get(2)?,
            subject: row.get(3)?,
            body: row.get(4)?,
            category: row.get(5)?,
            status: row.get(6)?,
            provider_message_id: row.get(7)?,
            sent_at: row.get(8)?,
            confirmation_request_id: row.get(9)?,
            replied_at: row.get(10)?,
            reply_body: row.get(11)?,
            reply_classification: row.get(12)?,
            reply_status: row.get(13)?,
        })
    }
}

impl TryFrom<OutboundEmailRow> for OutboundEmailRecord {
    type Error = DatabaseError;

    fn try_from(row: OutboundEmailRow) -> Result<Self, Self::Error> {
        Ok(Self {
            category: row.category.parse()?,
            status: row.status.parse()?,
            sent_at: parse_timestamp("sent_at", &row.sent_at)?,
            replied_at: parse_optional_timestamp("replied_at", row.replied_at.as_deref())?,
            reply_classification: row
                .reply_classification
                .as_deref()
                .map(str::parse::<ReplyClassification>)
                .transpose()?,
            reply_status: row
                .reply_status
                .as_deref()
                .map(str::parse::<ReplyStatus>)
                .transpose()?,
            id: row.id,
            recipient_address: row.recipient_address,
            recipient_name: row.recipient_name,
            subject: row.subject,
            body: row.body,
            provider_message_id: row.provider_message_id,
            confirmation_request_id: row.confirmation_request_id,
            reply_body: row.reply_body,
        })
    }
}

/// Journals a sent (or about to be sent) email and returns the stored record.
pub fn insert(db: &Database, email: &NewOutboundEmail) -> Result<OutboundEmailRecord, DatabaseError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = format_timestamp(&Utc::now());

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO outbound_emails (id, recipient_address, recipient_name, subject, body,
             category, status, provider_message_id, sent_at, confirmation_request_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                email.recipient_address,
                email.recipient_name,
                email.subject,
                email.body,
                email.category.as_str(),
                email.status.as_str(),
                email.provider_message_id,
                format_timestamp(&email.sent_at),
                email.confirmation_request_id,
                now,
            ],
        )?;
        Ok(())
    })?;

    get(db, &id)?.ok_or(DatabaseError::NotFound {
        entity: "outbound email",
        id,
    })
}

/// Loads one outbound email by id.
pub fn get(db: &Database, id: &str) -> Result<Option<OutboundEmailRecord>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM outbound_emails WHERE id = ?1", SELECT_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], OutboundEmailRow::from_row)
            .optional()?)
    })?;
    row.map(OutboundEmailRecord::try_from).transpose()
}

/// Finds the outbound email carrying the given provider message-id.
///
/// The column is unique, but the newest send wins if that ever breaks.
pub fn find_by_message_id(
    db: &Database,
    message_id: &str,
) -> Result<Option<OutboundEmailRecord>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM outbound_emails WHERE provider_message_id = ?1
             ORDER BY sent_at DESC LIMIT 1",
            SELECT_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![message_id], OutboundEmailRow::from_row)
            .optional()?)
    })?;
    row.map(OutboundEmailRecord::try_from).transpose()
}

/// Returns emails sent to `address` (case-insensitive) at or after `since`,
/// newest first.
pub fn find_by_recipient_since(
    db: &Database,
    address: &str,
    since: &DateTime<Utc>,
) -> Result<Vec<OutboundEmailRecord>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM outbound_emails
             WHERE recipient_address = ?1 COLLATE NOCASE AND sent_at >= ?2
             ORDER BY sent_at DESC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![address, format_timestamp(since)],
                OutboundEmailRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(OutboundEmailRecord::try_from).collect()
}

/// Records the outcome of the SMTP hand-off.
pub fn update_send_status(
    db: &Database,
    id: &str,
    status: SendStatus,
    provider_message_id: Option<&str>,
) -> Result<(), DatabaseError> {
    let changed = db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE outbound_emails
             SET status = ?1,
                 provider_message_id = COALESCE(?2, provider_message_id),
                 modified_at = ?3
             WHERE id = ?4",
            params![
                status.as_str(),
                provider_message_id,
                format_timestamp(&Utc::now()),
                id
            ],
        )?)
    })?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity: "outbound email",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Writes reply fields onto an outbound email.
///
/// The first reply date is kept. Only a `success` send moves to `responded`;
/// any other status is left as is.
pub fn update_reply(
    db: &Database,
    id: &str,
    reply: &ReplyUpdate,
    modified_by: &str,
) -> Result<(), DatabaseError> {
    let changed = db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE outbound_emails
             SET replied_at = COALESCE(replied_at, ?1),
                 reply_body = ?2,
                 reply_classification = ?3,
                 reply_status = ?4,
                 status = CASE WHEN status = 'success' THEN 'responded' ELSE status END,
                 modified_at = ?5,
                 modified_by = ?6
             WHERE id = ?7",
            params![
                format_timestamp(&reply.replied_at),
                reply.body,
                reply.classification.as_str(),
                reply.status.as_str(),
                format_timestamp(&Utc::now()),
                modified_by,
                id,
            ],
        )?)
    })?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity: "outbound email",
            id: id.to_string(),
        });
    }
    Ok(())
}

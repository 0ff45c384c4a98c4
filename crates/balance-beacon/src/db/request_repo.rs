//! Confirmation request repository: the `confirmation_requests` table.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{format_timestamp, parse_optional_timestamp, Database, DatabaseError};
use crate::model::{ConfirmationRequest, RequestResponse, ResponseType};

/// Creates a request in the `sent` state and returns it.
pub fn insert(
    db: &Database,
    partner_name: Option<&str>,
    balance_date: Option<&str>,
) -> Result<ConfirmationRequest, DatabaseError> {
    let id = uuid::Uuid::new_v4().to_string();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO confirmation_requests (id, partner_name, balance_date, status, created_at)
             VALUES (?1, ?2, ?3, 'sent', ?4)",
            params![id, partner_name, balance_date, format_timestamp(&Utc::now())],
        )?;
        Ok(())
    })?;

    get(db, &id)?.ok_or(DatabaseError::NotFound {
        entity: "confirmation request",
        id,
    })
}

/// Loads one confirmation request by id.
pub fn get(db: &Database, id: &str) -> Result<Option<ConfirmationRequest>, DatabaseError> {
    type RawRequest = (
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        String,
    );

    let raw: Option<RawRequest> = db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT id, partner_name, balance_date, response_date, response_type,
                        response_notes, status
                 FROM confirmation_requests WHERE id = ?1",
                params![id],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                    ))
                },
            )
            .optional()?)
    })?;

    let Some((id, partner_name, balance_date, response_date, response_type, notes, status)) = raw
    else {
        return Ok(None);
    };

    Ok(Some(ConfirmationRequest {
        id,
        partner_name,
        balance_date,
        response_date: parse_optional_timestamp("response_date", response_date.as_deref())?,
        response_type: response_type
            .as_deref()
            .map(str::parse::<ResponseType>)
            .transpose()?,
        response_notes: notes,
        status: status.parse()?,
    }))
}

/// Applies a partner response to a request.
///
/// Returns `false` when no request has that id.
pub fn update_response(
    db: &Database,
    id: &str,
    response: &RequestResponse,
) -> Result<bool, DatabaseError> {
    let changed = db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE confirmation_requests
             SET response_date = ?1,
                 response_type = COALESCE(?2, response_type),
                 response_notes = ?3,
                 status = ?4,
                 modified_at = ?5
             WHERE id = ?6",
            params![
                format_timestamp(&response.response_date),
                response.response_type.map(|t| t.as_str()),
                response.notes,
                response.status.as_str(),
                format_timestamp(&Utc::now()),
                id,
            ],
        )?)
    })?;
    Ok(changed > 0)
}

//! Reply statistics: aggregate views over the outbound journal.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use super::{days_before, format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::{EmailCategory, ReplyClassification};

/// Look-back window of the response statistics, in days.
pub const STATS_WINDOW_DAYS: i64 = 30;

/// Reply counts per classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyDistribution {
    pub confirmed: u64,
    pub disputed: u64,
    pub corrections: u64,
    pub general: u64,
}

/// Response statistics for confirmation and reminder emails.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStats {
    pub total_sent: u64,
    pub with_reply: u64,
    pub responded: u64,
    /// Percentage of sent emails that got a reply, two decimals.
    pub response_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_response_hours: Option<f64>,
    pub distribution: ReplyDistribution,
}

/// A recently answered outbound email.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentResponse {
    pub outbound_email_id: String,
    pub recipient_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub replied_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ReplyClassification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_body: Option<String>,
    pub status: String,
    pub category: String,
    pub priority_level: String,
    pub response_hours: f64,
}

fn hours_between(from: &DateTime<Utc>, to: &DateTime<Utc>) -> f64 {
    (*to - *from).num_seconds() as f64 / 3600.0
}

/// Computes response statistics over emails sent in the last
/// [`STATS_WINDOW_DAYS`] days, relative to `now`.
pub fn response_stats(db: &Database, now: &DateTime<Utc>) -> Result<ResponseStats, DatabaseError> {
    let since = format_timestamp(&days_before(now, STATS_WINDOW_DAYS));

    let rows: Vec<(String, Option<String>, Option<String>, String)> = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT sent_at, replied_at, reply_classification, status
             FROM outbound_emails
             WHERE sent_at >= ?1 AND category IN (?2, ?3)",
        )?;
        let rows = stmt
            .query_map(
                params![
                    since,
                    EmailCategory::Confirmare.as_str(),
                    EmailCategory::Reminder.as_str()
                ],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    let mut distribution = ReplyDistribution::default();
    let mut with_reply = 0u64;
    let mut responded = 0u64;
    let mut response_hours = Vec::new();

    for (sent_at, replied_at, classification, status) in &rows {
        if status == "responded" {
            responded += 1;
        }
        if let Some(replied_at) = replied_at {
            with_reply += 1;
            let sent = parse_timestamp("sent_at", sent_at)?;
            let replied = parse_timestamp("replied_at", replied_at)?;
            response_hours.push(hours_between(&sent, &replied));
        }
        match classification.as_deref().map(str::parse::<ReplyClassification>) {
            Some(Ok(ReplyClassification::Confirmed)) => distribution.confirmed += 1,
            Some(Ok(ReplyClassification::Disputed)) => distribution.disputed += 1,
            Some(Ok(ReplyClassification::Corrections)) => distribution.corrections += 1,
            Some(Ok(ReplyClassification::GeneralResponse)) => distribution.general += 1,
            Some(Err(e)) => return Err(e.into()),
            None => {}
        }
    }

    let total_sent = rows.len() as u64;
    let response_rate = if total_sent > 0 {
        (with_reply as f64 / total_sent as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };
    let avg_response_hours = if response_hours.is_empty() {
        None
    } else {
        Some(response_hours.iter().sum::<f64>() / response_hours.len() as f64)
    };

    Ok(ResponseStats {
        total_sent,
        with_reply,
        responded,
        response_rate,
        avg_response_hours,
        distribution,
    })
}

/// Lists emails answered within the last `days` days, newest reply first.
pub fn recent_responses(
    db: &Database,
    now: &DateTime<Utc>,
    days: u32,
    limit: u32,
) -> Result<Vec<RecentResponse>, DatabaseError> {
    let since = format_timestamp(&days_before(now, i64::from(days)));

    type RawRecent = (
        String,
        String,
        Option<String>,
        String,
        String,
        String,
        Option<String>,
        Option<String>,
        String,
        String,
        String,
    );

    let rows: Vec<RawRecent> = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, recipient_address, recipient_name, subject, sent_at, replied_at,
                    reply_classification, reply_body, status, category, priority_level
             FROM outbound_emails
             WHERE replied_at IS NOT NULL AND replied_at >= ?1
             ORDER BY replied_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![since, limit], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                    r.get(7)?,
                    r.get(8)?,
                    r.get(9)?,
                    r.get(10)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    rows.into_iter()
        .map(
            |(id, address, name, subject, sent_at, replied_at, class, body, status, cat, prio)| {
                let sent_at = parse_timestamp("sent_at", &sent_at)?;
                let replied_at = parse_timestamp("replied_at", &replied_at)?;
                Ok(RecentResponse {
                    outbound_email_id: id,
                    recipient_address: address,
                    recipient_name: name,
                    subject,
                    response_hours: hours_between(&sent_at, &replied_at),
                    sent_at,
                    replied_at,
                    classification: class
                        .as_deref()
                        .map(str::parse::<ReplyClassification>)
                        .transpose()?,
                    reply_body: body,
                    status,
                    category: cat,
                    priority_level: prio,
                })
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::db::outbound_repo;
    use crate::model::{NewOutboundEmail, ReplyStatus, ReplyUpdate, SendStatus};

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn send(db: &Database, category: EmailCategory, days_ago: i64) -> String {
        outbound_repo::insert(
            db,
            &NewOutboundEmail {
                recipient_address: "p@x.ro".to_string(),
                recipient_name: None,
                subject: "Cerere confirmare sold".to_string(),
                body: String::new(),
                category,
                status: SendStatus::Success,
                provider_message_id: None,
                sent_at: Utc::now() - Duration::days(days_ago),
                confirmation_request_id: None,
            },
        )
        .unwrap()
        .id
    }

    fn answer(db: &Database, id: &str, classification: ReplyClassification) {
        outbound_repo::update_reply(
            db,
            id,
            &ReplyUpdate {
                replied_at: Utc::now(),
                body: "răspuns".to_string(),
                classification,
                status: ReplyStatus::Received,
            },
            "test",
        )
        .unwrap();
    }

    #[test]
    fn test_response_stats_empty() {
        let db = test_db();
        let stats = response_stats(&db, &Utc::now()).unwrap();
        assert_eq!(stats.total_sent, 0);
        assert_eq!(stats.response_rate, 0.0);
        assert!(stats.avg_response_hours.is_none());
    }

    #[test]
    fn test_response_stats_counts_window_and_categories() {
        let db = test_db();
        let a = send(&db, EmailCategory::Confirmare, 2);
        let b = send(&db, EmailCategory::Reminder, 1);
        send(&db, EmailCategory::Confirmare, 3);
        send(&db, EmailCategory::Test, 1);
        send(&db, EmailCategory::Confirmare, 45);

        answer(&db, &a, ReplyClassification::Confirmed);
        answer(&db, &b, ReplyClassification::Disputed);

        let stats = response_stats(&db, &Utc::now()).unwrap();
        assert_eq!(stats.total_sent, 3);
        assert_eq!(stats.with_reply, 2);
        assert_eq!(stats.responded, 2);
        assert_eq!(stats.response_rate, 66.67);
        assert_eq!(stats.distribution.confirmed, 1);
        assert_eq!(stats.distribution.disputed, 1);
        let avg = stats.avg_response_hours.unwrap();
        assert!(avg > 23.0 && avg < 49.0, "avg = {}", avg);
    }

    #[test]
    fn test_recent_responses() {
        let db = test_db();
        let a = send(&db, EmailCategory::Confirmare, 2);
        send(&db, EmailCategory::Confirmare, 2);
        answer(&db, &a, ReplyClassification::Corrections);

        let recent = recent_responses(&db, &Utc::now(), 7, 20).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].outbound_email_id, a);
        assert_eq!(
            recent[0].classification,
            Some(ReplyClassification::Corrections)
        );
        assert_eq!(recent[0].priority_level, "NORMAL");
        assert!(recent[0].response_hours > 47.0);

        let none = recent_responses(&db, &(Utc::now() + Duration::days(30)), 7, 20).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_recent_responses_unbounded_days() {
        let db = test_db();
        let a = send(&db, EmailCategory::Confirmare, 2);
        answer(&db, &a, ReplyClassification::Confirmed);

        let all = recent_responses(&db, &Utc::now(), u32::MAX, 20).unwrap();
        assert_eq!(all.len(), 1);
    }
}

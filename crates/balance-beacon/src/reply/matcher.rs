//! Finds the outbound email a reply answers.
//!
//! Threading headers win. Without them the sender and subject are compared
//! against recent sends, which is a heuristic for mail clients that drop
//! `In-Reply-To`.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::store::ReplyStore;
use crate::db::{days_before, DatabaseError};
use crate::model::{OutboundEmailRecord, ParsedReply};

/// How far back the sender/subject fallback looks, in days.
pub const MATCH_WINDOW_DAYS: i64 = 30;

static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(.+?)>").expect("valid address regex"));

static REPLY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\s*(?:re|fwd?)\s*:)+\s*").expect("valid reply prefix regex")
});

/// How a reply was tied to its original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// `In-Reply-To` equals the stored provider message-id.
    MessageId,
    /// Same recipient, related subject, inside the window.
    SenderSubject,
}

/// The outbound email a reply answers.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedOriginal {
    pub record: OutboundEmailRecord,
    pub kind: MatchKind,
}

/// Returns the bare address of a `Name <addr>` string, or the trimmed input.
pub fn extract_address(from: &str) -> String {
    match ANGLE_ADDRESS.captures(from) {
        Some(caps) => caps[1].trim().to_string(),
        None => from.trim().to_string(),
    }
}

/// Strips leading `RE:`, `FW:` and `FWD:` markers, any number of them.
pub fn strip_reply_prefixes(subject: &str) -> &str {
    match REPLY_PREFIX.find(subject) {
        Some(m) => subject[m.end()..].trim_end(),
        None => subject.trim(),
    }
}

/// Whether a reply subject and a stored subject belong to the same thread.
///
/// Case-insensitive containment in either direction after prefix stripping.
/// Empty subjects never relate to anything.
pub fn subjects_related(reply_subject: &str, stored_subject: &str) -> bool {
    let reply = strip_reply_prefixes(reply_subject).to_lowercase();
    let stored = stored_subject.trim().to_lowercase();
    if reply.is_empty() || stored.is_empty() {
        return false;
    }
    stored.contains(&reply) || reply.contains(&stored)
}

/// Looks up the outbound email `reply` answers, as of `now`.
pub fn find_original<S: ReplyStore + ?Sized>(
    store: &S,
    reply: &ParsedReply,
    now: DateTime<Utc>,
    window_days: i64,
) -> Result<Option<MatchedOriginal>, DatabaseError> {
    if let Some(in_reply_to) = reply.in_reply_to.as_deref().filter(|id| !id.trim().is_empty()) {
        if let Some(record) = store.find_outbound_by_message_id(in_reply_to.trim())? {
            return Ok(Some(MatchedOriginal {
                record,
                kind: MatchKind::MessageId,
            }));
        }
        log::debug!(
            "In-Reply-To {} matches no outbound email, trying sender and subject",
            in_reply_to
        );
    }

    let sender = extract_address(&reply.from);
    if sender.is_empty() {
        return Ok(None);
    }
    let subject = strip_reply_prefixes(&reply.subject);
    let since = days_before(&now, window_days);

    Ok(store
        .find_outbound_by_recipient_and_subject_window(&sender, subject, &since)?
        .map(|record| MatchedOriginal {
            record,
            kind: MatchKind::SenderSubject,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::db::{outbound_repo, Database};
    use crate::model::{EmailCategory, NewOutboundEmail, SendStatus};

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn send(
        db: &Database,
        to: &str,
        subject: &str,
        message_id: Option<&str>,
        days_ago: i64,
    ) -> OutboundEmailRecord {
        outbound_repo::insert(
            db,
            &NewOutboundEmail {
                recipient_address: to.to_string(),
                recipient_name: None,
                subject: subject.to_string(),
                body: String::new(),
                category: EmailCategory::Confirmare,
                status: SendStatus::Success,
                provider_message_id: message_id.map(str::to_string),
                sent_at: Utc::now() - Duration::days(days_ago),
                confirmation_request_id: None,
            },
        )
        .unwrap()
    }

    fn reply(from: &str, subject: &str, in_reply_to: Option<&str>) -> ParsedReply {
        ParsedReply {
            message_id: "<reply@partner>".to_string(),
            from: from.to_string(),
            to: vec![],
            subject: subject.to_string(),
            text: String::new(),
            html: None,
            date: Utc::now(),
            in_reply_to: in_reply_to.map(str::to_string),
            references: vec![],
        }
    }

    #[test]
    fn test_extract_address() {
        assert_eq!(extract_address("Ion Pop <ion@x.ro>"), "ion@x.ro");
        assert_eq!(extract_address("  ion@x.ro "), "ion@x.ro");
        assert_eq!(extract_address("\"Pop, Ion\" < ion@x.ro >"), "ion@x.ro");
        assert_eq!(extract_address(""), "");
    }

    #[test]
    fn test_strip_reply_prefixes() {
        assert_eq!(strip_reply_prefixes("RE: Cerere"), "Cerere");
        assert_eq!(strip_reply_prefixes("re:Cerere"), "Cerere");
        assert_eq!(strip_reply_prefixes("Fwd: RE: Cerere "), "Cerere");
        assert_eq!(strip_reply_prefixes("FW: Cerere"), "Cerere");
        assert_eq!(strip_reply_prefixes("Cerere RE: x"), "Cerere RE: x");
        assert_eq!(strip_reply_prefixes("Reconciliere"), "Reconciliere");
    }

    #[test]
    fn test_subjects_related() {
        assert!(subjects_related("RE: Cerere confirmare sold", "Cerere confirmare sold"));
        assert!(subjects_related(
            "Cerere confirmare sold",
            "Cerere confirmare sold - Alfa SRL 30.09.2026"
        ));
        assert!(subjects_related(
            "RE: Cerere confirmare sold - Alfa SRL (urgent)",
            "Cerere confirmare sold - Alfa SRL"
        ));
        assert!(subjects_related("RE: CERERE ÎNCHIDERE", "cerere închidere"));
        assert!(!subjects_related("RE: Factura 12", "Cerere confirmare sold"));
        assert!(!subjects_related("RE:", "Cerere confirmare sold"));
        assert!(!subjects_related("Cerere", ""));
    }

    #[test]
    fn test_in_reply_to_is_authoritative() {
        let db = test_db();
        let original = send(&db, "partner@x.ro", "Cerere confirmare sold", Some("<msg-123>"), 60);
        send(&db, "other@y.ro", "Altceva", None, 1);

        // Sender, subject and age all disagree; the header still wins.
        let r = reply("Someone <other@y.ro>", "Altceva", Some("<msg-123>"));
        let matched = find_original(&db, &r, Utc::now(), MATCH_WINDOW_DAYS)
            .unwrap()
            .unwrap();
        assert_eq!(matched.record.id, original.id);
        assert_eq!(matched.kind, MatchKind::MessageId);
    }

    #[test]
    fn test_sender_subject_fallback_within_window() {
        let db = test_db();
        let original = send(&db, "partner@x.ro", "Cerere confirmare sold", None, 10);

        let r = reply("Partner <partner@x.ro>", "RE: Cerere confirmare sold", None);
        let matched = find_original(&db, &r, Utc::now(), MATCH_WINDOW_DAYS)
            .unwrap()
            .unwrap();
        assert_eq!(matched.record.id, original.id);
        assert_eq!(matched.kind, MatchKind::SenderSubject);
    }

    #[test]
    fn test_sender_subject_fallback_outside_window() {
        let db = test_db();
        send(&db, "partner@x.ro", "Cerere confirmare sold", None, 40);

        let r = reply("partner@x.ro", "RE: Cerere confirmare sold", None);
        assert!(find_original(&db, &r, Utc::now(), MATCH_WINDOW_DAYS)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_fallback_requires_exact_address() {
        let db = test_db();
        send(&db, "partner@x.ro", "Cerere confirmare sold", None, 1);

        let r = reply("partner@x.ro.evil", "RE: Cerere confirmare sold", None);
        assert!(find_original(&db, &r, Utc::now(), MATCH_WINDOW_DAYS)
            .unwrap()
            .is_none());

        let r = reply("PARTNER@X.RO", "RE: Cerere confirmare sold", None);
        assert!(find_original(&db, &r, Utc::now(), MATCH_WINDOW_DAYS)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_fallback_picks_most_recent() {
        let db = test_db();
        send(&db, "partner@x.ro", "Cerere confirmare sold", None, 20);
        let newer = send(&db, "partner@x.ro", "Cerere confirmare sold", None, 3);

        let r = reply("partner@x.ro", "RE: Cerere confirmare sold", None);
        let matched = find_original(&db, &r, Utc::now(), MATCH_WINDOW_DAYS)
            .unwrap()
            .unwrap();
        assert_eq!(matched.record.id, newer.id);
    }

    #[test]
    fn test_unknown_in_reply_to_falls_back() {
        let db = test_db();
        let original = send(&db, "partner@x.ro", "Cerere confirmare sold", None, 2);

        let r = reply("partner@x.ro", "RE: Cerere confirmare sold", Some("<unknown@x>"));
        let matched = find_original(&db, &r, Utc::now(), MATCH_WINDOW_DAYS)
            .unwrap()
            .unwrap();
        assert_eq!(matched.record.id, original.id);
        assert_eq!(matched.kind, MatchKind::SenderSubject);
    }
}

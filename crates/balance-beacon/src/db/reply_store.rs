//! `ReplyStore` backed by the SQLite journal.

use chrono::{DateTime, Utc};

use super::processed_repo::{self, ProcessedOutcome};
use super::{orphan_repo, outbound_repo, request_repo, Database, DatabaseError};
use crate::model::{NewOrphanReply, OutboundEmailRecord, ReplyUpdate, RequestResponse};
use crate::reply::matcher::subjects_related;
use crate::reply::ReplyStore;

/// Audit name written into `modified_by` for monitor updates.
pub const MONITOR_ACTOR: &str = "EMAIL_MONITOR_SERVICE";

impl ReplyStore for Database {
    fn find_outbound_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<OutboundEmailRecord>, DatabaseError> {
        outbound_repo::find_by_message_id(self, message_id)
    }

    fn find_outbound_by_recipient_and_subject_window(
        &self,
        address: &str,
        subject_fragment: &str,
        since: &DateTime<Utc>,
    ) -> Result<Option<OutboundEmailRecord>, DatabaseError> {
        // Candidates come back newest first; the subject test runs in Rust so
        // diacritics compare case-insensitively.
        let candidates = outbound_repo::find_by_recipient_since(self, address, since)?;
        Ok(candidates
            .into_iter()
            .find(|record| subjects_related(subject_fragment, &record.subject)))
    }

    fn update_outbound_reply(&self, id: &str, reply: &ReplyUpdate) -> Result<(), DatabaseError> {
        outbound_repo::update_reply(self, id, reply, MONITOR_ACTOR)
    }

    fn update_confirmation_request(
        &self,
        id: &str,
        response: &RequestResponse,
    ) -> Result<bool, DatabaseError> {
        request_repo::update_response(self, id, response)
    }

    fn insert_orphan_reply(&self, orphan: &NewOrphanReply) -> Result<i64, DatabaseError> {
        orphan_repo::insert(self, orphan)
    }

    fn is_message_processed(&self, message_id: &str) -> Result<bool, DatabaseError> {
        processed_repo::contains(self, message_id)
    }

    fn mark_message_processed(
        &self,
        message_id: &str,
        outcome: &ProcessedOutcome,
    ) -> Result<(), DatabaseError> {
        processed_repo::insert(self, message_id, outcome)
    }
}

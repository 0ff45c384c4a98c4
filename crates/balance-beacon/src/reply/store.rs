//! Persistence seam used by the correlation pipeline.

use chrono::{DateTime, Utc};

use crate::db::processed_repo::ProcessedOutcome;
use crate::db::DatabaseError;
use crate::model::{NewOrphanReply, OutboundEmailRecord, ReplyUpdate, RequestResponse};

/// Storage operations the reply pipeline needs.
///
/// Each call is expected to be atomic for the single record it touches.
pub trait ReplyStore: Send + Sync {
    /// Outbound email whose provider message-id equals `message_id`.
    fn find_outbound_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<OutboundEmailRecord>, DatabaseError>;

    /// Most recent outbound email sent to `address` at or after `since` whose
    /// subject is related to `subject_fragment`.
    fn find_outbound_by_recipient_and_subject_window(
        &self,
        address: &str,
        subject_fragment: &str,
        since: &DateTime<Utc>,
    ) -> Result<Option<OutboundEmailRecord>, DatabaseError>;

    /// Writes reply fields onto an outbound email.
    fn update_outbound_reply(&self, id: &str, reply: &ReplyUpdate) -> Result<(), DatabaseError>;

    /// Applies a response to a confirmation request; `false` if it does not exist.
    fn update_confirmation_request(
        &self,
        id: &str,
        response: &RequestResponse,
    ) -> Result<bool, DatabaseError>;

    /// Files an unmatched reply and returns its id.
    fn insert_orphan_reply(&self, orphan: &NewOrphanReply) -> Result<i64, DatabaseError>;

    /// Whether an inbound message-id was already applied.
    fn is_message_processed(&self, message_id: &str) -> Result<bool, DatabaseError>;

    /// Records an inbound message-id as applied.
    fn mark_message_processed(
        &self,
        message_id: &str,
        outcome: &ProcessedOutcome,
    ) -> Result<(), DatabaseError>;
}

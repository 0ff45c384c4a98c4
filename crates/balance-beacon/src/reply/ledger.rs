//! Applies a correlated reply to the journal, or files it as an orphan.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::classifier::classify;
use super::matcher::{find_original, MatchKind, MATCH_WINDOW_DAYS};
use super::store::ReplyStore;
use crate::db::processed_repo::ProcessedOutcome;
use crate::email::EmailError;
use crate::model::{
    NewOrphanReply, ParsedReply, ReplyClassification, ReplyStatus, ReplyUpdate, RequestResponse,
};

/// What happened to one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOutcome {
    /// The reply was written onto an outbound email.
    Matched {
        outbound_email_id: String,
        classification: ReplyClassification,
        kind: MatchKind,
        /// Whether a linked confirmation request was updated too.
        request_updated: bool,
    },
    /// No original was found; the reply was filed for manual triage.
    Orphaned { orphan_id: i64 },
    /// The message-id was applied by an earlier tick.
    AlreadyProcessed,
}

/// Correlates, classifies and persists replies.
#[derive(Clone)]
pub struct LedgerUpdater {
    store: Arc<dyn ReplyStore>,
    match_window_days: i64,
}

impl LedgerUpdater {
    pub fn new(store: Arc<dyn ReplyStore>) -> Self {
        Self {
            store,
            match_window_days: MATCH_WINDOW_DAYS,
        }
    }

    /// Overrides the look-back window of the sender/subject fallback.
    pub fn with_match_window_days(mut self, days: i64) -> Self {
        self.match_window_days = days;
        self
    }

    /// Whether `message_id` was already applied. Replies without a
    /// message-id are never considered processed.
    pub fn is_processed(&self, message_id: &str) -> Result<bool, EmailError> {
        if message_id.is_empty() {
            return Ok(false);
        }
        Ok(self.store.is_message_processed(message_id)?)
    }

    /// Applies one reply as of `now`.
    pub fn apply(
        &self,
        reply: &ParsedReply,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, EmailError> {
        if self.is_processed(&reply.message_id)? {
            log::debug!("Message {} already applied, skipping", reply.message_id);
            return Ok(LedgerOutcome::AlreadyProcessed);
        }

        let original = find_original(self.store.as_ref(), reply, now, self.match_window_days)?;
        let (outcome, processed) = match original {
            Some(original) => {
                let classification = classify(&reply.subject, &reply.readable_text());
                let record = original.record;

                self.store.update_outbound_reply(
                    &record.id,
                    &ReplyUpdate {
                        replied_at: reply.date,
                        body: reply.content().to_string(),
                        classification,
                        status: ReplyStatus::Received,
                    },
                )?;

                let mut request_updated = false;
                if let Some(request_id) = &record.confirmation_request_id {
                    request_updated = self.store.update_confirmation_request(
                        request_id,
                        &RequestResponse {
                            response_date: reply.date,
                            response_type: classification.response_type(),
                            notes: Some(reply.content().to_string()).filter(|n| !n.is_empty()),
                            status: classification.request_status(),
                        },
                    )?;
                    if !request_updated {
                        log::warn!(
                            "Confirmation request {} linked from email {} does not exist",
                            request_id,
                            record.id
                        );
                    }
                }

                log::info!(
                    "Reply from {} matched email {} ({:?}) as {}",
                    reply.from,
                    record.id,
                    original.kind,
                    classification
                );

                (
                    LedgerOutcome::Matched {
                        outbound_email_id: record.id.clone(),
                        classification,
                        kind: original.kind,
                        request_updated,
                    },
                    ProcessedOutcome::Matched {
                        outbound_email_id: record.id,
                    },
                )
            }
            None => {
                let orphan_id = self.store.insert_orphan_reply(&NewOrphanReply {
                    message_id: Some(reply.message_id.clone()).filter(|id| !id.is_empty()),
                    from_address: reply.from.clone(),
                    subject: reply.subject.clone(),
                    content: reply.content().to_string(),
                    received_at: reply.date,
                    in_reply_to: reply.in_reply_to.clone(),
                })?;
                log::info!(
                    "No original email for reply from {}, filed as orphan {}",
                    reply.from,
                    orphan_id
                );
                (
                    LedgerOutcome::Orphaned { orphan_id },
                    ProcessedOutcome::Orphaned { orphan_id },
                )
            }
        };

        if !reply.message_id.is_empty() {
            self.store
                .mark_message_processed(&reply.message_id, &processed)?;
        }

        Ok(outcome)
    }
}

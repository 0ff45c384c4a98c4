//! Mailbox poller: fetches unseen replies for one tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info_span, Instrument};

use crate::config::{MonitorSettings, SeenPolicy};
use crate::db::days_before;

use super::error::Result;
use super::transport::{MailboxConnector, MailboxSession, RawMessage};

/// Messages fetched by one poll, with the session they came from still open.
///
/// Under [`SeenPolicy::AfterApply`] the caller flags each message through
/// `session` once it has been handled, then closes the session.
pub struct FetchedBatch {
    pub session: Box<dyn MailboxSession>,
    pub messages: Vec<RawMessage>,
}

/// Opens the reply folder and pulls unseen messages.
#[derive(Clone)]
pub struct MailboxPoller {
    connector: Arc<dyn MailboxConnector>,
    folder: String,
    window_days: u32,
}

impl MailboxPoller {
    pub fn new(connector: Arc<dyn MailboxConnector>, settings: &MonitorSettings) -> Self {
        Self {
            connector,
            folder: settings.folder.clone(),
            window_days: settings.window_days,
        }
    }

    /// Connects, selects the folder read-write, searches `UNSEEN SINCE`
    /// `now - window_days` and fetches every hit. Under
    /// [`SeenPolicy::OnFetch`] the fetch itself flags the messages.
    pub async fn fetch_unseen_since(
        &self,
        now: DateTime<Utc>,
        seen_policy: SeenPolicy,
    ) -> Result<FetchedBatch> {
        let span = info_span!(
            "mailbox_poll",
            mailbox = %self.connector.describe(),
            folder = %self.folder
        );
        self.poll(now, seen_policy == SeenPolicy::OnFetch)
            .instrument(span)
            .await
    }

    async fn poll(&self, now: DateTime<Utc>, mark_seen: bool) -> Result<FetchedBatch> {
        let mut session = self.connector.connect().await?;

        match self.fetch_with(session.as_mut(), now, mark_seen).await {
            Ok(messages) => Ok(FetchedBatch { session, messages }),
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    log::debug!("Closing session after failed poll: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn fetch_with(
        &self,
        session: &mut dyn MailboxSession,
        now: DateTime<Utc>,
        mark_seen: bool,
    ) -> Result<Vec<RawMessage>> {
        let total = session.open_inbox(&self.folder).await?;
        let since = days_before(&now, i64::from(self.window_days)).date_naive();
        let uids = session.search_unseen_since(since).await?;

        log::info!(
            "{} unseen of {} messages in {} since {}",
            uids.len(),
            total,
            self.folder,
            since
        );

        if uids.is_empty() {
            return Ok(Vec::new());
        }

        session.fetch_messages(&uids, mark_seen).await
    }
}

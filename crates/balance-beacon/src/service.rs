//! Operations exposed to the HTTP layer.

use std::sync::Arc;

use chrono::Utc;

use crate::config::{self, MailboxConfig, MonitorSettings};
use crate::db::orphan_repo::{self, OrphanPage};
use crate::db::stats_repo::{self, RecentResponse, ResponseStats};
use crate::db::{outbound_repo, request_repo, Database, DatabaseError};
use crate::email::{EmailError, ImapConnector, MailboxConnector};
use crate::error::BeaconError;
use crate::model::{
    ConfirmationRequest, NewOutboundEmail, OrphanResolution, OutboundEmailRecord, SendStatus,
};
use crate::monitor::{EmailMonitor, MonitorStatus, TickOutcome};

pub const DEFAULT_RECENT_DAYS: u32 = 7;
pub const DEFAULT_RECENT_LIMIT: u32 = 20;
pub const DEFAULT_ORPHAN_LIMIT: u32 = 50;

/// Reply tracking facade: the monitor plus the journal queries around it.
pub struct ReplyTrackingService {
    db: Database,
    monitor: EmailMonitor,
}

impl ReplyTrackingService {
    pub fn new(
        db: Database,
        connector: Option<Arc<dyn MailboxConnector>>,
        settings: &MonitorSettings,
    ) -> Self {
        let monitor = EmailMonitor::new(connector, Arc::new(db.clone()), settings);
        Self { db, monitor }
    }

    /// Builds the service from `IMAP_*` and `BEACON_*` environment variables.
    /// Without mailbox variables the service still serves journal queries.
    pub fn from_env(db: Database) -> Result<Self, BeaconError> {
        let settings = config::settings_from_env()?;
        let connector = MailboxConfig::from_env()?.map(|mailbox| {
            log::info!(
                "Mailbox configured: {}@{} (tls: {})",
                mailbox.user,
                mailbox.address(),
                mailbox.use_tls
            );
            Arc::new(ImapConnector::new(mailbox)) as Arc<dyn MailboxConnector>
        });
        if connector.is_none() {
            log::warn!("No mailbox configured, reply monitoring unavailable");
        }
        Ok(Self::new(db, connector, &settings))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn monitor(&self) -> &EmailMonitor {
        &self.monitor
    }

    pub async fn start_monitoring(
        &self,
        interval_minutes: Option<u32>,
    ) -> Result<TickOutcome, EmailError> {
        self.monitor.start_monitoring(interval_minutes).await
    }

    pub fn stop_monitoring(&self) -> bool {
        self.monitor.stop_monitoring()
    }

    pub async fn check_now(&self) -> Result<TickOutcome, EmailError> {
        self.monitor.check_now().await
    }

    pub fn status(&self) -> MonitorStatus {
        self.monitor.status()
    }

    /// Reply statistics over the last 30 days.
    pub fn response_stats(&self) -> Result<ResponseStats, DatabaseError> {
        stats_repo::response_stats(&self.db, &Utc::now())
    }

    /// Emails answered within `days` (default 7), at most `limit` (default 20).
    pub fn recent_responses(
        &self,
        days: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<RecentResponse>, DatabaseError> {
        stats_repo::recent_responses(
            &self.db,
            &Utc::now(),
            days.unwrap_or(DEFAULT_RECENT_DAYS),
            limit.unwrap_or(DEFAULT_RECENT_LIMIT),
        )
    }

    /// Unprocessed orphans, newest first (default page: 50 from offset 0).
    pub fn list_orphans(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<OrphanPage, DatabaseError> {
        orphan_repo::list_unprocessed(
            &self.db,
            limit.unwrap_or(DEFAULT_ORPHAN_LIMIT),
            offset.unwrap_or(0),
        )
    }

    /// Closes an orphan after manual review. A second call for the same id
    /// fails with [`DatabaseError::OrphanAlreadyProcessed`].
    pub fn process_orphan(
        &self,
        id: i64,
        linked_to_email_id: Option<String>,
        notes: Option<String>,
        processed_by: &str,
    ) -> Result<(), DatabaseError> {
        if let Some(email_id) = linked_to_email_id.as_deref() {
            if outbound_repo::get(&self.db, email_id)?.is_none() {
                return Err(DatabaseError::NotFound {
                    entity: "outbound email",
                    id: email_id.to_string(),
                });
            }
        }

        let resolution = OrphanResolution {
            linked_to_email_id,
            processing_notes: notes,
        };
        orphan_repo::mark_processed(&self.db, id, &resolution, processed_by, &Utc::now())?;
        log::info!("Orphan reply {} processed by {}", id, processed_by);
        Ok(())
    }

    /// Journals an email handed to the sending provider.
    pub fn record_outbound(
        &self,
        email: &NewOutboundEmail,
    ) -> Result<OutboundEmailRecord, DatabaseError> {
        outbound_repo::insert(&self.db, email)
    }

    /// Records the provider's verdict on a send.
    pub fn update_send_status(
        &self,
        id: &str,
        status: SendStatus,
        provider_message_id: Option<&str>,
    ) -> Result<(), DatabaseError> {
        outbound_repo::update_send_status(&self.db, id, status, provider_message_id)
    }

    pub fn record_confirmation_request(
        &self,
        partner_name: Option<&str>,
        balance_date: Option<&str>,
    ) -> Result<ConfirmationRequest, DatabaseError> {
        request_repo::insert(&self.db, partner_name, balance_date)
    }
}

//! Test harness for isolated monitor runs.
//!
//! Each harness owns a temporary directory holding a file-backed journal,
//! a fake mailbox and a service wired to both.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use balance_beacon::email::MailboxConnector;
use balance_beacon::model::{NewOutboundEmail, OutboundEmailRecord};
use balance_beacon::monitor::{TickOutcome, TickReport};
use balance_beacon::{Database, MonitorSettings, ReplyTrackingService};

use super::mailbox::FakeMailbox;

pub struct TestHarness {
    _temp_dir: TempDir,
    pub db: Database,
    pub mailbox: Arc<FakeMailbox>,
    pub service: ReplyTrackingService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(MonitorSettings::default())
    }

    pub fn with_settings(settings: MonitorSettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("data").join("beacon.db"))
            .expect("Failed to open test database");
        let mailbox = FakeMailbox::new();
        let service = ReplyTrackingService::new(
            db.clone(),
            Some(Arc::clone(&mailbox) as Arc<dyn MailboxConnector>),
            &settings,
        );

        Self {
            _temp_dir: temp_dir,
            db,
            mailbox,
            service,
        }
    }

    pub fn send(&self, email: NewOutboundEmail) -> OutboundEmailRecord {
        self.service
            .record_outbound(&email)
            .expect("Failed to journal outbound email")
    }

    /// Runs one manual tick and returns its report, panicking on any other outcome.
    pub async fn tick(&self) -> TickReport {
        match self.service.check_now().await.expect("check_now failed") {
            TickOutcome::Completed(report) => report,
            other => panic!("expected a completed tick, got {:?}", other),
        }
    }
}

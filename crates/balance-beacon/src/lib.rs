//! Reply tracking for balance-confirmation emails.
//!
//! The crate polls an IMAP mailbox for partner replies, correlates each reply
//! with the outbound email it answers, classifies it and records the result
//! in the SQLite email journal. Replies that match nothing are kept as
//! orphans for manual review.

pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod reply;
pub mod secrets;
pub mod service;

pub use config::{MailboxConfig, MonitorSettings, SeenPolicy};
pub use db::{Database, DatabaseError};
pub use email::EmailError;
pub use error::{BeaconError, ConfigError, Result};
pub use monitor::{EmailMonitor, MonitorStatus, TickOutcome, TickReport};
pub use reply::{LedgerOutcome, LedgerUpdater, ReplyStore};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use service::ReplyTrackingService;

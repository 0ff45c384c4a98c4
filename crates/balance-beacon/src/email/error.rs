//! Mailbox and reply pipeline error types.

use thiserror::Error;

use crate::db::DatabaseError;

/// Errors that can occur while polling the mailbox or applying replies.
#[derive(Error, Debug)]
pub enum EmailError {
    /// Monitoring was requested but no mailbox is configured.
    #[error("Mailbox configuration missing: set IMAP_HOST, IMAP_USER and IMAP_PASSWORD")]
    ConfigurationMissing,

    /// Failed to reach the IMAP server.
    #[error("IMAP connection failed: {0}")]
    MailboxConnection(String),

    /// TLS/SSL error during connection.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// SELECT, SEARCH, FETCH or STORE failed.
    #[error("IMAP protocol error: {0}")]
    MailboxProtocol(String),

    /// A fetched message could not be parsed.
    #[error("Failed to parse email: {0}")]
    Parse(String),

    /// The journal could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),

    /// The mailbox phase of a tick exceeded its time budget.
    #[error("Mailbox operation timed out after {0} seconds")]
    MailboxTimeout(u64),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<async_native_tls::Error> for EmailError {
    fn from(err: async_native_tls::Error) -> Self {
        EmailError::Tls(err.to_string())
    }
}

/// Result type for email operations.
pub type Result<T> = std::result::Result<T, EmailError>;

//! Mailbox transport seam.
//!
//! The poller talks to these traits so ticks can run against IMAP in
//! production and against an in-memory mailbox in tests.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::error::Result;

/// One fetched message, still in RFC 5322 form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub uid: u32,
    pub body: Vec<u8>,
}

/// Opens authenticated mailbox sessions.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Connects and logs in.
    async fn connect(&self) -> Result<Box<dyn MailboxSession>>;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

/// A logged-in mailbox session, owned by one tick.
#[async_trait]
pub trait MailboxSession: Send {
    /// Selects `folder` read-write. Returns the message count.
    async fn open_inbox(&mut self, folder: &str) -> Result<u32>;

    /// UIDs of unseen messages received on or after `since`.
    async fn search_unseen_since(&mut self, since: NaiveDate) -> Result<Vec<u32>>;

    /// Fetches full messages. With `mark_seen` the fetch itself sets `\Seen`.
    async fn fetch_messages(&mut self, uids: &[u32], mark_seen: bool) -> Result<Vec<RawMessage>>;

    /// Sets `\Seen` on one message.
    async fn mark_seen(&mut self, uid: u32) -> Result<()>;

    /// Logs out.
    async fn close(&mut self) -> Result<()>;
}

/// Formats a date the way IMAP `SEARCH SINCE` expects it (`19-Oct-2026`).
pub fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imap_date() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 9).unwrap();
        assert_eq!(imap_date(date), "09-Oct-2026");
    }
}

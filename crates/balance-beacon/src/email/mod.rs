//! Reply mailbox access.
//!
//! This module reads partner replies from an IMAP inbox: the transport seam,
//! the async-imap implementation of it, the message parser and the poller
//! that drives one fetch per monitor tick.

pub mod client;
pub mod error;
pub mod parser;
pub mod poller;
pub mod transport;

pub use client::{ImapClient, ImapConnector};
pub use error::EmailError;
pub use parser::{parse_reply, parse_reply_at};
pub use poller::{FetchedBatch, MailboxPoller};
pub use transport::{imap_date, MailboxConnector, MailboxSession, RawMessage};

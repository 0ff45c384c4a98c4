//! Reply correlation: matching, classification and journal updates.
//!
//! The matcher and classifier are plain functions over strings so they can
//! be tested without a mailbox; the ledger applies their verdict through a
//! [`ReplyStore`].

pub mod classifier;
pub mod ledger;
pub mod matcher;
pub mod store;

pub use classifier::classify;
pub use ledger::{LedgerOutcome, LedgerUpdater};
pub use matcher::{extract_address, find_original, strip_reply_prefixes, subjects_related};
pub use store::ReplyStore;

//! Shared test utilities for balance-beacon integration tests.
//!
//! This module provides:
//! - `FakeMailbox`, an in-memory IMAP stand-in with seen flags and a gate
//! - Builders for raw partner replies and outbound journal entries
//! - `TestHarness`, a file-backed database wired to a fake mailbox

pub mod builders;
pub mod harness;
pub mod mailbox;

pub use builders::*;
pub use harness::TestHarness;
pub use mailbox::FakeMailbox;

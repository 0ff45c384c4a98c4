//! In-memory mailbox implementing the transport seam.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::watch;

use balance_beacon::email::error::Result;
use balance_beacon::email::{EmailError, MailboxConnector, MailboxSession, RawMessage};

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub uid: u32,
    pub body: Vec<u8>,
    pub received_on: NaiveDate,
    pub seen: bool,
}

#[derive(Debug, Default)]
struct MailboxState {
    messages: Vec<StoredMessage>,
    next_uid: u32,
    connects: u32,
    closes: u32,
    refuse_connections: Option<String>,
}

/// A mailbox shared by every session it hands out.
///
/// `hold` makes new connections wait until `release`, which is how tests
/// keep a tick in flight. `hold_flags` does the same for `mark_seen`.
pub struct FakeMailbox {
    state: Arc<Mutex<MailboxState>>,
    gate: watch::Sender<bool>,
    flag_gate: watch::Sender<bool>,
}

impl FakeMailbox {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        let (flag_gate, _) = watch::channel(true);
        Arc::new(Self {
            state: Arc::new(Mutex::new(MailboxState {
                next_uid: 1,
                ..MailboxState::default()
            })),
            gate,
            flag_gate,
        })
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().expect("mailbox state poisoned")
    }

    /// Delivers a message received today. Returns its UID.
    pub fn deliver(&self, raw: impl Into<Vec<u8>>) -> u32 {
        self.deliver_on(raw, Utc::now().date_naive())
    }

    pub fn deliver_on(&self, raw: impl Into<Vec<u8>>, received_on: NaiveDate) -> u32 {
        let mut state = self.lock();
        let uid = state.next_uid;
        state.next_uid += 1;
        state.messages.push(StoredMessage {
            uid,
            body: raw.into(),
            received_on,
            seen: false,
        });
        uid
    }

    pub fn is_seen(&self, uid: u32) -> bool {
        self.lock()
            .messages
            .iter()
            .any(|m| m.uid == uid && m.seen)
    }

    pub fn mark_unseen(&self, uid: u32) {
        for message in self.lock().messages.iter_mut().filter(|m| m.uid == uid) {
            message.seen = false;
        }
    }

    pub fn unseen_count(&self) -> usize {
        self.lock().messages.iter().filter(|m| !m.seen).count()
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub fn closes(&self) -> u32 {
        self.lock().closes
    }

    pub fn refuse_connections(&self, reason: &str) {
        self.lock().refuse_connections = Some(reason.to_string());
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn hold_flags(&self) {
        self.flag_gate.send_replace(false);
    }

    pub fn release_flags(&self) {
        self.flag_gate.send_replace(true);
    }
}

#[async_trait]
impl MailboxConnector for FakeMailbox {
    async fn connect(&self) -> Result<Box<dyn MailboxSession>> {
        {
            let mut state = self.lock();
            state.connects += 1;
            if let Some(reason) = &state.refuse_connections {
                return Err(EmailError::MailboxConnection(reason.clone()));
            }
        }

        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|e| EmailError::MailboxConnection(e.to_string()))?;

        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
            flag_gate: self.flag_gate.subscribe(),
            selected: false,
        }))
    }

    fn describe(&self) -> String {
        "fake@localhost:993".to_string()
    }
}

struct FakeSession {
    state: Arc<Mutex<MailboxState>>,
    flag_gate: watch::Receiver<bool>,
    selected: bool,
}

impl FakeSession {
    fn lock(&self) -> Result<MutexGuard<'_, MailboxState>> {
        if !self.selected {
            return Err(EmailError::MailboxProtocol("no folder selected".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| EmailError::MailboxProtocol("mailbox state poisoned".to_string()))
    }
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn open_inbox(&mut self, folder: &str) -> Result<u32> {
        if folder != "INBOX" {
            return Err(EmailError::MailboxProtocol(format!("no such folder {}", folder)));
        }
        self.selected = true;
        Ok(self.lock()?.messages.len() as u32)
    }

    async fn search_unseen_since(&mut self, since: NaiveDate) -> Result<Vec<u32>> {
        Ok(self
            .lock()?
            .messages
            .iter()
            .filter(|m| !m.seen && m.received_on >= since)
            .map(|m| m.uid)
            .collect())
    }

    async fn fetch_messages(&mut self, uids: &[u32], mark_seen: bool) -> Result<Vec<RawMessage>> {
        let mut state = self.lock()?;
        let mut fetched = Vec::new();
        for message in state.messages.iter_mut().filter(|m| uids.contains(&m.uid)) {
            if mark_seen {
                message.seen = true;
            }
            fetched.push(RawMessage {
                uid: message.uid,
                body: message.body.clone(),
            });
        }
        Ok(fetched)
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        self.flag_gate
            .wait_for(|open| *open)
            .await
            .map_err(|e| EmailError::MailboxProtocol(e.to_string()))?;
        for message in self.lock()?.messages.iter_mut().filter(|m| m.uid == uid) {
            message.seen = true;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state
            .lock()
            .map_err(|_| EmailError::MailboxProtocol("mailbox state poisoned".to_string()))?
            .closes += 1;
        Ok(())
    }
}

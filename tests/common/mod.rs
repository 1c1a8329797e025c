//! In-memory mailbox implementing `MailStore` for integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use cleanmail::imap::{MailStore, RawHeaders};
use cleanmail::{EngineConfig, EngineError, EngineResult, Session};

#[derive(Clone, Debug)]
pub struct FakeMessage {
    pub uid: u32,
    pub from: Option<String>,
    pub unsubscribe: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Default)]
pub struct MailboxState {
    pub messages: Vec<FakeMessage>,
    pub next_uid: u32,
    pub logouts: usize,
    pub header_fetches: usize,
    pub store_calls: usize,
    /// Header fetch call (1-based) at which the connection drops.
    pub drop_on_header_fetch: Option<usize>,
    /// STORE call (1-based) at which the connection drops.
    pub drop_on_store: Option<usize>,
    /// UIDs removed by another client right before our STORE lands.
    pub vanish_before_store: HashSet<u32>,
    pub reject_expunge: bool,
    /// EXPUNGE answers OK but removes nothing.
    pub expunge_noop: bool,
    /// Header fetch call (1-based) after which another client expunges the
    /// first message in the mailbox.
    pub shrink_after_header_fetch: Option<usize>,
    /// UIDs the server volunteers in every header FETCH response.
    pub unsolicited: Vec<u32>,
}

impl MailboxState {
    pub fn live_senders(&self) -> Vec<Option<String>> {
        self.messages.iter().map(|m| m.from.clone()).collect()
    }
}

/// Cheap handle shared between the test and the store it hands to a session.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    pub state: Arc<Mutex<MailboxState>>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        let mailbox = Self::default();
        mailbox.state.lock().unwrap().next_uid = 100;
        mailbox
    }

    pub fn add(&self, from: &str) -> u32 {
        self.add_message(Some(from), None)
    }

    pub fn add_with_unsubscribe(&self, from: &str, unsubscribe: &str) -> u32 {
        self.add_message(Some(from), Some(unsubscribe))
    }

    pub fn add_message(&self, from: Option<&str>, unsubscribe: Option<&str>) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.next_uid += 1;
        let uid = state.next_uid;
        state.messages.push(FakeMessage {
            uid,
            from: from.map(str::to_string),
            unsubscribe: unsubscribe.map(str::to_string),
            deleted: false,
        });
        uid
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn logouts(&self) -> usize {
        self.state.lock().unwrap().logouts
    }

    pub fn store(&self) -> FakeStore {
        FakeStore {
            state: Arc::clone(&self.state),
        }
    }

    pub fn session(&self, config: &EngineConfig) -> Session<FakeStore> {
        Session::from_store(self.store(), config.clone())
    }
}

pub struct FakeStore {
    state: Arc<Mutex<MailboxState>>,
}

fn header_block(message: &FakeMessage) -> Vec<u8> {
    let mut raw = String::new();
    if let Some(from) = &message.from {
        raw.push_str(&format!("From: {from}\r\n"));
    }
    if let Some(unsubscribe) = &message.unsubscribe {
        raw.push_str(&format!("List-Unsubscribe: {unsubscribe}\r\n"));
    }
    raw.push_str("\r\n");
    raw.into_bytes()
}

fn connection_lost(command: &str) -> EngineError {
    EngineError::Connectivity(format!("{command}: connection lost"))
}

impl MailStore for FakeStore {
    async fn select(&mut self, _mailbox: &str) -> EngineResult<u32> {
        Ok(self.state.lock().unwrap().messages.len() as u32)
    }

    async fn search_all(&mut self) -> EngineResult<Vec<u32>> {
        let state = self.state.lock().unwrap();
        Ok(state.messages.iter().map(|m| m.uid).collect())
    }

    async fn search_sender(&mut self, address: &str) -> EngineResult<Vec<u32>> {
        let needle = address.to_lowercase();
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .filter(|m| {
                m.from
                    .as_deref()
                    .is_some_and(|f| f.to_lowercase().contains(&needle))
            })
            .map(|m| m.uid)
            .collect())
    }

    async fn fetch_header_fields(&mut self, uids: &[u32]) -> EngineResult<Vec<RawHeaders>> {
        let mut state = self.state.lock().unwrap();
        state.header_fetches += 1;
        if state.drop_on_header_fetch == Some(state.header_fetches) {
            return Err(connection_lost("FETCH"));
        }
        let mut found: Vec<RawHeaders> = state
            .messages
            .iter()
            .filter(|m| uids.contains(&m.uid))
            .map(|m| RawHeaders {
                uid: m.uid,
                bytes: header_block(m),
            })
            .collect();
        found.extend(state.unsolicited.iter().map(|&uid| RawHeaders {
            uid,
            bytes: b"From: stray@x.com\r\n\r\n".to_vec(),
        }));
        if state.shrink_after_header_fetch == Some(state.header_fetches)
            && !state.messages.is_empty()
        {
            state.messages.remove(0);
        }
        Ok(found)
    }

    async fn store_deleted(&mut self, uids: &[u32]) -> EngineResult<Vec<u32>> {
        let mut state = self.state.lock().unwrap();
        state.store_calls += 1;
        if state.drop_on_store == Some(state.store_calls) {
            return Err(connection_lost("STORE"));
        }
        let vanished = std::mem::take(&mut state.vanish_before_store);
        state.messages.retain(|m| !vanished.contains(&m.uid));

        let mut acked = Vec::new();
        for message in state.messages.iter_mut() {
            if uids.contains(&message.uid) {
                message.deleted = true;
                acked.push(message.uid);
            }
        }
        Ok(acked)
    }

    async fn expunge(&mut self, uids: &[u32]) -> EngineResult<u32> {
        let mut state = self.state.lock().unwrap();
        if state.reject_expunge {
            return Err(EngineError::Rejected {
                command: "EXPUNGE",
                reason: "mailbox is read-only".to_string(),
            });
        }
        if state.expunge_noop {
            return Ok(0);
        }
        let before = state.messages.len();
        state
            .messages
            .retain(|m| !(m.deleted && uids.contains(&m.uid)));
        Ok((before - state.messages.len()) as u32)
    }

    async fn logout(&mut self) -> EngineResult<()> {
        self.state.lock().unwrap().logouts += 1;
        Ok(())
    }
}

pub fn small_batches() -> EngineConfig {
    EngineConfig {
        batch_size: 3,
        delete_batch_size: 2,
        ..EngineConfig::default()
    }
}

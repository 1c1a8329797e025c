use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rough header throughput used for user-facing time estimates.
pub const ESTIMATED_MESSAGES_PER_SEC: u64 = 50;

const UNKNOWN_SENDER: &str = "unknown";

/// Normalized sender address used as the aggregation key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderKey(String);

impl SenderKey {
    /// Normalize a bare address. Anything that does not look like
    /// `local@domain` maps to the unknown sender.
    pub fn parse(address: &str) -> Self {
        let trimmed = address
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>')
            .trim();
        match trimmed.rsplit_once('@') {
            Some((local, domain))
                if !local.is_empty()
                    && !domain.is_empty()
                    && !trimmed.chars().any(char::is_whitespace) =>
            {
                SenderKey(trimmed.to_lowercase())
            }
            _ => Self::unknown(),
        }
    }

    pub fn unknown() -> Self {
        SenderKey(UNKNOWN_SENDER.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_SENDER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned message identifier, tied to the session that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageRef {
    session: u64,
    uid: u32,
}

impl MessageRef {
    pub(crate) fn new(session: u64, uid: u32) -> Self {
        Self { session, uid }
    }

    pub(crate) fn session_id(&self) -> u64 {
        self.session
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }
}

/// Header fields the engine cares about for one message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedHeader {
    pub from_display_name: Option<String>,
    pub from_address: SenderKey,
    pub unsubscribe_candidates: Vec<String>,
}

impl Default for SenderKey {
    fn default() -> Self {
        Self::unknown()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderStat {
    pub display_name: Option<String>,
    pub sender: SenderKey,
    pub count: u64,
    pub unsubscribe_link: Option<String>,
}

impl SenderStat {
    pub fn new(sender: SenderKey) -> Self {
        Self {
            display_name: None,
            sender,
            count: 0,
            unsubscribe_link: None,
        }
    }

    pub fn has_web_unsubscribe(&self) -> bool {
        self.unsubscribe_link
            .as_deref()
            .is_some_and(crate::headers::is_web_link)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub processed: u64,
    pub total: u64,
}

impl ScanProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.processed as f64 / self.total as f64
    }

    pub fn estimated_remaining(&self) -> Duration {
        let left = self.total.saturating_sub(self.processed);
        Duration::from_secs(left / ESTIMATED_MESSAGES_PER_SEC)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeletionFailure {
    pub uid: u32,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeletionResult {
    pub sender: SenderKey,
    pub removed: u64,
    pub failures: Vec<DeletionFailure>,
}

impl DeletionResult {
    pub fn new(sender: SenderKey) -> Self {
        Self {
            sender,
            removed: 0,
            failures: Vec::new(),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn attempted(&self) -> u64 {
        self.removed + self.failures.len() as u64
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record_failure(&mut self, uid: u32, reason: impl Into<String>) {
        self.failures.push(DeletionFailure {
            uid,
            reason: reason.into(),
        });
    }

    /// Turn a result with per-message failures into a hard error.
    pub fn ensure_complete(self) -> Result<Self, crate::errors::EngineError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(crate::errors::EngineError::PartialDeletion {
                result: Box::new(self),
            })
        }
    }
}

/// Address plus application password. Never logged.
#[derive(Clone)]
pub struct Credentials {
    pub address: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(address: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

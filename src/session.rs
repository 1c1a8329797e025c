use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::imap::{ImapStore, MailStore};
use crate::types::Credentials;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// An authenticated handle to one mailbox. Exclusively owned by whoever runs
/// the current operation and closed once that operation ends.
pub struct Session<S: MailStore = ImapStore> {
    id: u64,
    store: Option<S>,
    config: EngineConfig,
}

impl Session<ImapStore> {
    /// Connect over TLS and log in.
    pub async fn open(credentials: &Credentials, config: &EngineConfig) -> EngineResult<Self> {
        let store = ImapStore::connect(credentials, config).await?;
        Ok(Self::from_store(store, config.clone()))
    }
}

impl<S: MailStore> Session<S> {
    /// Wrap an already authenticated store.
    pub fn from_store(store: S, config: EngineConfig) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, "Session opened");
        Self {
            id,
            store: Some(store),
            config,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    pub(crate) fn store(&mut self) -> EngineResult<&mut S> {
        self.store.as_mut().ok_or(EngineError::SessionClosed)
    }

    /// Log out. Safe to call more than once; logout failures are only logged
    /// since the connection is discarded either way.
    pub async fn close(&mut self) {
        let Some(mut store) = self.store.take() else {
            return;
        };
        match store.logout().await {
            Ok(()) => debug!(session = self.id, "Session closed"),
            Err(e) => warn!(session = self.id, error = %e, "Logout failed; dropping connection"),
        }
    }
}

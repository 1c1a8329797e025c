use std::collections::VecDeque;

use tracing::debug;

use crate::errors::{EngineError, EngineResult};
use crate::imap::MailStore;
use crate::session::Session;
use crate::types::{MessageRef, SenderKey};

/// Which messages an enumeration covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageFilter {
    All,
    Sender(SenderKey),
}

/// One batch of refs plus the number of snapshot entries it covered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageBatch {
    pub refs: Vec<MessageRef>,
    pub span: u64,
}

/// Lazy, single-pass cursor over a UID snapshot taken when enumeration
/// started. Messages expunged later by other clients stay in the snapshot and
/// are dropped when their headers are fetched; mail arriving later is not
/// seen. Once exhausted it stays exhausted; enumerate again with
/// [`list_messages`].
#[derive(Debug)]
pub struct MessageCursor {
    session: u64,
    total: u64,
    batch_size: usize,
    pending: VecDeque<u32>,
}

/// Start enumerating the configured mailbox. The UID list, and so the total,
/// is fixed here, at call time.
pub async fn list_messages<S: MailStore>(
    session: &mut Session<S>,
    filter: &MessageFilter,
) -> EngineResult<MessageCursor> {
    let mailbox = session.config().mailbox.clone();
    let batch_size = session.config().batch_size.max(1);
    let session_id = session.id();
    if let MessageFilter::Sender(key) = filter {
        if key.is_unknown() {
            return Err(EngineError::InvalidSender(key.clone()));
        }
    }
    let store = session.store()?;
    let exists = store.select(&mailbox).await?;

    let uids = match filter {
        MessageFilter::All => store.search_all().await?,
        MessageFilter::Sender(key) => store.search_sender(key.as_str()).await?,
    };
    debug!(
        mailbox = %mailbox,
        exists,
        snapshot = uids.len(),
        filter = ?filter,
        "Enumeration snapshot taken"
    );

    Ok(MessageCursor {
        session: session_id,
        total: uids.len() as u64,
        batch_size,
        pending: uids.into(),
    })
}

impl MessageCursor {
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    /// Next batch, or `None` once every message has been handed out.
    pub async fn next_batch<S: MailStore>(
        &mut self,
        session: &mut Session<S>,
    ) -> EngineResult<Option<MessageBatch>> {
        if session.id() != self.session {
            return Err(EngineError::ForeignReference);
        }
        if self.is_exhausted() {
            return Ok(None);
        }

        let take = self.batch_size.min(self.pending.len());
        let session_id = self.session;
        let refs: Vec<MessageRef> = self
            .pending
            .drain(..take)
            .map(|uid| MessageRef::new(session_id, uid))
            .collect();
        Ok(Some(MessageBatch {
            span: refs.len() as u64,
            refs,
        }))
    }
}

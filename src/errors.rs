use std::time::Duration;

use thiserror::Error;

use crate::types::{DeletionResult, SenderKey};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("connection error: {0}")]
    Connectivity(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("server rejected {command}: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },
    #[error(
        "{} of {} messages from {} could not be deleted",
        .result.failed(),
        .result.attempted(),
        .result.sender
    )]
    PartialDeletion { result: Box<DeletionResult> },
    #[error(
        "deletion for {} interrupted after {} removed: {source}",
        .partial.sender,
        .partial.removed
    )]
    DeletionInterrupted {
        partial: Box<DeletionResult>,
        #[source]
        source: Box<EngineError>,
    },
    #[error("cannot delete by sender {0}")]
    InvalidSender(SenderKey),
    #[error("message reference belongs to another session")]
    ForeignReference,
    #[error("session already closed")]
    SessionClosed,
    #[error("scan cancelled")]
    Cancelled,
    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    /// Connection-level failures. Timeouts and rejected commands count too: the
    /// session state is unknown after any of them.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            EngineError::Connectivity(_)
                | EngineError::Timeout { .. }
                | EngineError::Rejected { .. }
                | EngineError::DeletionInterrupted { .. }
                | EngineError::SessionClosed
        )
    }

    /// Whether re-running the whole operation on a fresh session may succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_connectivity() || matches!(self, EngineError::Cancelled)
    }

    /// Partial deletion result carried by the error, if any.
    pub fn partial_deletion(&self) -> Option<&DeletionResult> {
        match self {
            EngineError::PartialDeletion { result } => Some(result),
            EngineError::DeletionInterrupted { partial, .. } => Some(partial),
            _ => None,
        }
    }

    pub(crate) fn from_imap(command: &'static str, err: async_imap::error::Error) -> Self {
        use async_imap::error::Error as ImapError;

        match err {
            ImapError::No(reason) | ImapError::Bad(reason) => EngineError::Rejected {
                command,
                reason: reason.trim().to_string(),
            },
            ImapError::Io(e) => EngineError::Connectivity(format!("{command}: {e}")),
            ImapError::ConnectionLost => {
                EngineError::Connectivity(format!("{command}: connection lost"))
            }
            other => EngineError::Connectivity(format!("{command}: {other}")),
        }
    }
}

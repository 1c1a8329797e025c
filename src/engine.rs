use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregate::{aggregate_cancellable, ScanObserver, ScanResult};
use crate::cleanup::delete_by_sender;
use crate::config::EngineConfig;
use crate::errors::EngineResult;
use crate::imap::MailStore;
use crate::session::Session;
use crate::types::{Credentials, DeletionResult, SenderKey};

/// Entry points for the presentation layer. Each call opens its own session
/// and closes it before returning, on success and on failure alike.
pub struct Engine {
    credentials: Credentials,
    config: EngineConfig,
}

impl Engine {
    pub fn new(credentials: Credentials, config: EngineConfig) -> Self {
        Self {
            credentials,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Verify that the credentials work.
    pub async fn check(&self) -> EngineResult<()> {
        let mut session = Session::open(&self.credentials, &self.config).await?;
        session.close().await;
        info!(address = %self.credentials.address, "Credentials verified");
        Ok(())
    }

    pub async fn scan<O: ScanObserver>(
        &self,
        observer: O,
        cancel: &CancellationToken,
    ) -> EngineResult<ScanResult> {
        let session = Session::open(&self.credentials, &self.config).await?;
        scan_session(session, observer, cancel).await
    }

    pub async fn delete_senders(
        &self,
        senders: &[SenderKey],
    ) -> (Vec<DeletionResult>, EngineResult<()>) {
        match Session::open(&self.credentials, &self.config).await {
            Ok(session) => delete_senders_session(session, senders).await,
            Err(e) => (Vec::new(), Err(e)),
        }
    }
}

/// Run a full scan on `session`, then close it.
pub async fn scan_session<S, O>(
    mut session: Session<S>,
    observer: O,
    cancel: &CancellationToken,
) -> EngineResult<ScanResult>
where
    S: MailStore,
    O: ScanObserver,
{
    let result = aggregate_cancellable(&mut session, observer, cancel).await;
    session.close().await;
    result
}

/// Delete messages for each sender in order over `session`, then close it.
/// Stops at the first error; results for senders already handled are
/// returned alongside it.
pub async fn delete_senders_session<S: MailStore>(
    mut session: Session<S>,
    senders: &[SenderKey],
) -> (Vec<DeletionResult>, EngineResult<()>) {
    let mut results = Vec::with_capacity(senders.len());
    let mut outcome = Ok(());
    for sender in senders {
        match delete_by_sender(&mut session, sender).await {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!(sender = %sender, error = %e, "Stopping cleanup");
                outcome = Err(e);
                break;
            }
        }
    }

    session.close().await;
    (results, outcome)
}

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::enumerate::{list_messages, MessageFilter};
use crate::errors::{EngineError, EngineResult};
use crate::headers::{best_unsubscribe_link, fetch_headers, is_web_link};
use crate::imap::MailStore;
use crate::session::Session;
use crate::types::{ParsedHeader, ScanProgress, SenderKey, SenderStat};

/// Receives progress after every completed batch. Must return promptly.
pub trait ScanObserver {
    fn on_progress(&mut self, progress: ScanProgress);
}

impl<F: FnMut(ScanProgress)> ScanObserver for F {
    fn on_progress(&mut self, progress: ScanProgress) {
        self(progress)
    }
}

/// Observer that ignores progress.
pub struct NoProgress;

impl ScanObserver for NoProgress {
    fn on_progress(&mut self, _progress: ScanProgress) {}
}

/// Point-in-time sender statistics from one scan. Stale as soon as anything
/// is deleted from the mailbox.
#[derive(Clone, Debug, Serialize)]
pub struct ScanResult {
    pub senders: HashMap<SenderKey, SenderStat>,
    pub total: u64,
    pub fetched: u64,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    fn new(total: u64) -> Self {
        Self {
            senders: HashMap::new(),
            total,
            fetched: 0,
            scanned_at: Utc::now(),
        }
    }

    pub fn get(&self, key: &SenderKey) -> Option<&SenderStat> {
        self.senders.get(key)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Stats sorted by count, largest first, ties by address.
    pub fn ranked(&self) -> Vec<&SenderStat> {
        let mut stats: Vec<&SenderStat> = self.senders.values().collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sender.cmp(&b.sender)));
        stats
    }

    pub fn into_map(self) -> HashMap<SenderKey, SenderStat> {
        self.senders
    }

    /// Fold one parsed header in. Display name and unsubscribe link keep the
    /// first non-empty value, except that a web link replaces a mailto link.
    pub fn record(&mut self, header: ParsedHeader) {
        self.fetched += 1;
        let stat = self
            .senders
            .entry(header.from_address.clone())
            .or_insert_with(|| SenderStat::new(header.from_address));
        stat.count += 1;

        if stat.display_name.is_none() {
            stat.display_name = header.from_display_name.filter(|n| !n.is_empty());
        }

        if let Some(link) = best_unsubscribe_link(&header.unsubscribe_candidates) {
            let upgrade = match stat.unsubscribe_link.as_deref() {
                None => true,
                Some(existing) => !is_web_link(existing) && is_web_link(link),
            };
            if upgrade {
                stat.unsubscribe_link = Some(link.to_string());
            }
        }
    }
}

/// Scan the whole mailbox into per-sender statistics.
pub async fn aggregate<S, O>(session: &mut Session<S>, observer: O) -> EngineResult<ScanResult>
where
    S: MailStore,
    O: ScanObserver,
{
    aggregate_cancellable(session, observer, &CancellationToken::new()).await
}

/// Like [`aggregate`], checking `cancel` between batches. A cancelled or
/// failed scan returns no partial statistics.
pub async fn aggregate_cancellable<S, O>(
    session: &mut Session<S>,
    mut observer: O,
    cancel: &CancellationToken,
) -> EngineResult<ScanResult>
where
    S: MailStore,
    O: ScanObserver,
{
    let start = Instant::now();
    let mut cursor = list_messages(session, &MessageFilter::All).await?;
    let total = cursor.total();
    info!(session = session.id(), total, "Starting mailbox scan");

    let mut result = ScanResult::new(total);
    let mut processed = 0u64;

    loop {
        if cancel.is_cancelled() {
            warn!(session = session.id(), processed, total, "Scan cancelled");
            return Err(EngineError::Cancelled);
        }

        let batch_start = Instant::now();
        let Some(batch) = cursor.next_batch(session).await? else {
            break;
        };

        let headers = fetch_headers(session, &batch.refs).await?;
        for message in &batch.refs {
            if let Some(header) = headers.get(message) {
                result.record(header.clone());
            }
        }

        processed = (processed + batch.span).min(total);
        debug!(
            processed,
            total,
            fetched = headers.len(),
            elapsed_ms = ?batch_start.elapsed().as_millis(),
            "Scan batch processed"
        );
        observer.on_progress(ScanProgress { processed, total });
    }

    info!(
        session = session.id(),
        total,
        fetched = result.fetched,
        senders = result.len(),
        elapsed_ms = ?start.elapsed().as_millis(),
        "Mailbox scan completed"
    );
    Ok(result)
}

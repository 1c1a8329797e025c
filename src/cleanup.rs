use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::enumerate::{list_messages, MessageFilter};
use crate::errors::{EngineError, EngineResult};
use crate::headers::fetch_headers;
use crate::imap::MailStore;
use crate::session::Session;
use crate::types::{DeletionResult, MessageRef, SenderKey};

const VANISHED: &str = "message no longer in mailbox";
const STILL_PRESENT: &str = "still in mailbox after expunge";

/// Delete every message currently attributed to `sender`.
///
/// Matches are found afresh, re-checked against their From header, then
/// flagged and expunged batch by batch. Per-message and per-batch failures end
/// up in the returned result. A lost connection aborts with
/// [`EngineError::DeletionInterrupted`] carrying what was removed so far;
/// batches already expunged stay expunged.
pub async fn delete_by_sender<S: MailStore>(
    session: &mut Session<S>,
    sender: &SenderKey,
) -> EngineResult<DeletionResult> {
    let start = Instant::now();
    let mut result = DeletionResult::new(sender.clone());

    let delete_batch_size = session.config().delete_batch_size;
    let mut cursor = match list_messages(session, &MessageFilter::Sender(sender.clone())).await {
        Ok(cursor) => cursor.with_batch_size(delete_batch_size),
        Err(e) => return Err(interrupted(result, e)),
    };
    info!(sender = %sender, candidates = cursor.total(), "Deleting messages by sender");

    loop {
        let batch = match cursor.next_batch(session).await {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(e) => return Err(interrupted(result, e)),
        };
        if let Err(e) = delete_batch(session, sender, &batch.refs, &mut result).await {
            return Err(interrupted(result, e));
        }
    }

    info!(
        sender = %sender,
        removed = result.removed,
        failed = result.failed(),
        elapsed_ms = ?start.elapsed().as_millis(),
        "Deletion by sender finished"
    );
    Ok(result)
}

/// Verify, flag and expunge one batch. Command rejections are recorded in
/// `result`; only connection-level errors are returned.
async fn delete_batch<S: MailStore>(
    session: &mut Session<S>,
    sender: &SenderKey,
    refs: &[MessageRef],
    result: &mut DeletionResult,
) -> EngineResult<()> {
    let headers = match fetch_headers(session, refs).await {
        Ok(headers) => headers,
        Err(EngineError::Rejected { reason, .. }) => {
            warn!(sender = %sender, reason = %reason, "Header check rejected; skipping batch");
            for message in refs {
                result.record_failure(message.uid(), format!("header check rejected: {reason}"));
            }
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let mut matched = Vec::with_capacity(refs.len());
    for message in refs {
        match headers.get(message) {
            None => result.record_failure(message.uid(), VANISHED),
            Some(header) if header.from_address == *sender => matched.push(message.uid()),
            Some(header) => debug!(
                uid = message.uid(),
                from = %header.from_address,
                "Search match has a different sender; leaving it alone"
            ),
        }
    }
    if matched.is_empty() {
        return Ok(());
    }

    let store = session.store()?;
    let flagged: HashSet<u32> = match store.store_deleted(&matched).await {
        Ok(acked) => acked.into_iter().collect(),
        Err(EngineError::Rejected { reason, .. }) => {
            warn!(sender = %sender, reason = %reason, "STORE rejected; skipping batch");
            for uid in &matched {
                result.record_failure(*uid, format!("flagging rejected: {reason}"));
            }
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let mut committed = Vec::with_capacity(flagged.len());
    for uid in &matched {
        if flagged.contains(uid) {
            committed.push(*uid);
        } else {
            result.record_failure(*uid, VANISHED);
        }
    }
    if committed.is_empty() {
        return Ok(());
    }

    let expunged = match store.expunge(&committed).await {
        Ok(expunged) => expunged as usize,
        Err(EngineError::Rejected { reason, .. }) => {
            warn!(sender = %sender, reason = %reason, "EXPUNGE rejected; messages stay flagged");
            for uid in committed {
                result.record_failure(uid, format!("expunge rejected: {reason}"));
            }
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let survivors: HashSet<u32> = if expunged < committed.len() {
        // The count alone cannot say which ones are left; ask the mailbox.
        let still_there = store.fetch_header_fields(&committed).await?;
        still_there.into_iter().map(|raw| raw.uid).collect()
    } else {
        HashSet::new()
    };

    let mut removed = 0u64;
    for uid in committed {
        if survivors.contains(&uid) {
            result.record_failure(uid, STILL_PRESENT);
        } else {
            removed += 1;
        }
    }
    if !survivors.is_empty() {
        warn!(
            sender = %sender,
            expunged,
            survivors = survivors.len(),
            "Flagged messages survived EXPUNGE"
        );
    }
    result.removed += removed;
    debug!(sender = %sender, removed, "Batch expunged");
    Ok(())
}

fn interrupted(partial: DeletionResult, source: EngineError) -> EngineError {
    match source {
        // Nothing was attempted; pass the error through unchanged.
        EngineError::InvalidSender(_) | EngineError::ForeignReference => source,
        source => EngineError::DeletionInterrupted {
            partial: Box::new(partial),
            source: Box::new(source),
        },
    }
}

//! Header fetching and parsing. Only the header fields needed for sender
//! statistics ever cross the wire.
mod unsubscribe;

use std::collections::{HashMap, HashSet};

use mailparse::{addrparse_header, parse_headers, MailAddr, MailHeader, MailHeaderMap};
use tracing::{debug, warn};

use crate::errors::{EngineError, EngineResult};
use crate::imap::MailStore;
use crate::session::Session;
use crate::types::{MessageRef, ParsedHeader, SenderKey};

pub use unsubscribe::{best_unsubscribe_link, extract_unsubscribe_candidates, is_web_link};

/// Fetch and parse headers for one batch of refs. Refs the server no longer
/// knows about are missing from the result; malformed headers map to the
/// unknown sender instead of failing the batch.
pub async fn fetch_headers<S: MailStore>(
    session: &mut Session<S>,
    refs: &[MessageRef],
) -> EngineResult<HashMap<MessageRef, ParsedHeader>> {
    let session_id = session.id();
    if refs.iter().any(|r| r.session_id() != session_id) {
        return Err(EngineError::ForeignReference);
    }
    if refs.is_empty() {
        return Ok(HashMap::new());
    }

    let uids: Vec<u32> = refs.iter().map(MessageRef::uid).collect();
    let requested: HashSet<u32> = uids.iter().copied().collect();
    let raw = session.store()?.fetch_header_fields(&uids).await?;

    let mut parsed = HashMap::with_capacity(raw.len());
    for item in raw {
        if !requested.contains(&item.uid) {
            debug!(uid = item.uid, "Ignoring unsolicited FETCH response");
            continue;
        }
        let message = MessageRef::new(session_id, item.uid);
        parsed.insert(message, parse_header_block(&item.bytes));
    }

    if parsed.len() < requested.len() {
        debug!(
            requested = refs.len(),
            returned = parsed.len(),
            "Some messages vanished before their headers were fetched"
        );
    }
    Ok(parsed)
}

/// Parse a raw header block into the fields the aggregator needs.
pub fn parse_header_block(bytes: &[u8]) -> ParsedHeader {
    let headers = match parse_headers(bytes) {
        Ok((headers, _)) => headers,
        Err(e) => {
            warn!(error = %e, "Unparseable header block; counting as unknown sender");
            return ParsedHeader::default();
        }
    };

    let (from_display_name, from_address) = headers
        .get_first_header("From")
        .and_then(parse_sender)
        .or_else(|| headers.get_first_header("Sender").and_then(parse_sender))
        .unwrap_or((None, SenderKey::unknown()));

    let unsubscribe_candidates = headers
        .get_all_headers("List-Unsubscribe")
        .iter()
        .flat_map(|h| extract_unsubscribe_candidates(&h.get_value()))
        .collect();

    ParsedHeader {
        from_display_name,
        from_address,
        unsubscribe_candidates,
    }
}

fn parse_sender(header: &MailHeader) -> Option<(Option<String>, SenderKey)> {
    let list = addrparse_header(header).ok()?;
    let (display_name, addr) = list.iter().find_map(|addr| match addr {
        MailAddr::Single(info) => Some((info.display_name.clone(), info.addr.clone())),
        MailAddr::Group(group) => group
            .addrs
            .first()
            .map(|info| (info.display_name.clone(), info.addr.clone())),
    })?;

    let key = SenderKey::parse(&addr);
    if key.is_unknown() {
        return None;
    }
    let display_name = display_name
        .map(|name| name.trim().trim_matches('"').trim().to_string())
        .filter(|name| !name.is_empty());
    Some((display_name, key))
}

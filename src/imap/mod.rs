//! IMAP transport: the `MailStore` seam and its async-imap implementation over
//! tokio-rustls.
pub mod provider;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_imap::types::Fetch;
use async_imap::{Client, Session};
use futures::TryStreamExt;
use rustls_native_certs::load_native_certs;
use tokio::net::TcpStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::types::Credentials;
use provider::ImapEndpoint;

pub use provider::IMAPS_PORT;

/// Header fields requested for every message. PEEK keeps `\Seen` untouched.
pub const HEADER_FETCH_QUERY: &str =
    "(UID BODY.PEEK[HEADER.FIELDS (FROM SENDER LIST-UNSUBSCRIBE)])";

type TlsSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// Raw header block for one message, as returned by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawHeaders {
    pub uid: u32,
    pub bytes: Vec<u8>,
}

/// The mailbox operations the engine needs. One command in flight at a time,
/// hence `&mut self` everywhere.
#[allow(async_fn_in_trait)]
pub trait MailStore {
    /// Select a mailbox and return its current message count.
    async fn select(&mut self, mailbox: &str) -> EngineResult<u32>;

    /// UIDs of every message in the selected mailbox, ascending.
    async fn search_all(&mut self) -> EngineResult<Vec<u32>>;

    /// UIDs of messages whose From header matches `address`.
    async fn search_sender(&mut self, address: &str) -> EngineResult<Vec<u32>>;

    /// Header blocks for the given UIDs. Messages that no longer exist are
    /// simply absent from the result.
    async fn fetch_header_fields(&mut self, uids: &[u32]) -> EngineResult<Vec<RawHeaders>>;

    /// Flag the given UIDs `\Deleted`, returning the UIDs the server
    /// acknowledged.
    async fn store_deleted(&mut self, uids: &[u32]) -> EngineResult<Vec<u32>>;

    /// Permanently remove flagged messages among `uids`, returning how many
    /// were expunged.
    async fn expunge(&mut self, uids: &[u32]) -> EngineResult<u32>;

    async fn logout(&mut self) -> EngineResult<()>;
}

/// Production `MailStore` speaking IMAP over implicit TLS.
pub struct ImapStore {
    session: TlsSession,
    command_timeout: Duration,
    uidplus: Option<bool>,
}

impl ImapStore {
    pub async fn connect(credentials: &Credentials, config: &EngineConfig) -> EngineResult<Self> {
        let endpoint = ImapEndpoint::resolve(
            &credentials.address,
            config.host.as_deref(),
            config.port,
        )
        .ok_or_else(|| {
            EngineError::Config(format!(
                "cannot derive IMAP server from address {}",
                credentials.address
            ))
        })?;

        let start = Instant::now();
        let session = with_timeout(
            "connect",
            config.connect_timeout(),
            connect_and_login(&endpoint, credentials),
        )
        .await?;

        info!(
            host = %endpoint.host,
            port = endpoint.port,
            elapsed_ms = ?start.elapsed().as_millis(),
            "IMAP session established"
        );

        Ok(Self {
            session,
            command_timeout: config.command_timeout(),
            uidplus: None,
        })
    }

    async fn supports_uidplus(&mut self) -> EngineResult<bool> {
        if let Some(known) = self.uidplus {
            return Ok(known);
        }
        let session = &mut self.session;
        let caps = with_timeout("CAPABILITY", self.command_timeout, async {
            session
                .capabilities()
                .await
                .map_err(|e| EngineError::from_imap("CAPABILITY", e))
        })
        .await?;
        let known = caps.has_str("UIDPLUS");
        debug!(uidplus = known, "Checked server capabilities");
        self.uidplus = Some(known);
        Ok(known)
    }
}

impl MailStore for ImapStore {
    async fn select(&mut self, mailbox: &str) -> EngineResult<u32> {
        let session = &mut self.session;
        let selected = with_timeout("SELECT", self.command_timeout, async {
            session
                .select(mailbox)
                .await
                .map_err(|e| EngineError::from_imap("SELECT", e))
        })
        .await?;
        debug!(mailbox = %mailbox, exists = selected.exists, "Mailbox selected");
        Ok(selected.exists)
    }

    async fn search_all(&mut self) -> EngineResult<Vec<u32>> {
        let session = &mut self.session;
        let found = with_timeout("SEARCH", self.command_timeout, async {
            session
                .uid_search("ALL")
                .await
                .map_err(|e| EngineError::from_imap("SEARCH", e))
        })
        .await?;

        let mut uids: Vec<u32> = found.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn search_sender(&mut self, address: &str) -> EngineResult<Vec<u32>> {
        let query = format!("FROM {}", quote_imap_string(address));
        let session = &mut self.session;
        let found = with_timeout("SEARCH", self.command_timeout, async {
            session
                .uid_search(&query)
                .await
                .map_err(|e| EngineError::from_imap("SEARCH", e))
        })
        .await?;

        let mut uids: Vec<u32> = found.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_header_fields(&mut self, uids: &[u32]) -> EngineResult<Vec<RawHeaders>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let uid_seq = build_uid_sequence(uids);
        let session = &mut self.session;
        let fetches = with_timeout("FETCH", self.command_timeout, async {
            session
                .uid_fetch(&uid_seq, HEADER_FETCH_QUERY)
                .await
                .map_err(|e| EngineError::from_imap("FETCH", e))?
                .try_collect::<Vec<Fetch>>()
                .await
                .map_err(|e| EngineError::from_imap("FETCH", e))
        })
        .await?;

        Ok(fetches
            .iter()
            .filter_map(|fetch| {
                let uid = fetch.uid?;
                let bytes = fetch.header().or_else(|| fetch.body()).unwrap_or(&[]);
                Some(RawHeaders {
                    uid,
                    bytes: bytes.to_vec(),
                })
            })
            .collect())
    }

    async fn store_deleted(&mut self, uids: &[u32]) -> EngineResult<Vec<u32>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let uid_seq = build_uid_sequence(uids);
        let session = &mut self.session;
        let fetches = with_timeout("STORE", self.command_timeout, async {
            session
                .uid_store(&uid_seq, "+FLAGS (\\Deleted)")
                .await
                .map_err(|e| EngineError::from_imap("STORE", e))?
                .try_collect::<Vec<Fetch>>()
                .await
                .map_err(|e| EngineError::from_imap("STORE", e))
        })
        .await?;

        Ok(fetches.iter().filter_map(|f| f.uid).collect())
    }

    async fn expunge(&mut self, uids: &[u32]) -> EngineResult<u32> {
        if uids.is_empty() {
            return Ok(0);
        }
        let scoped = self.supports_uidplus().await?;
        let uid_seq = build_uid_sequence(uids);
        let session = &mut self.session;
        let expunged = with_timeout("EXPUNGE", self.command_timeout, async {
            if scoped {
                session
                    .uid_expunge(&uid_seq)
                    .await
                    .map_err(|e| EngineError::from_imap("EXPUNGE", e))?
                    .try_collect::<Vec<u32>>()
                    .await
                    .map_err(|e| EngineError::from_imap("EXPUNGE", e))
            } else {
                session
                    .expunge()
                    .await
                    .map_err(|e| EngineError::from_imap("EXPUNGE", e))?
                    .try_collect::<Vec<u32>>()
                    .await
                    .map_err(|e| EngineError::from_imap("EXPUNGE", e))
            }
        })
        .await?;

        Ok(expunged.len() as u32)
    }

    async fn logout(&mut self) -> EngineResult<()> {
        let session = &mut self.session;
        with_timeout("LOGOUT", self.command_timeout, async {
            session
                .logout()
                .await
                .map_err(|e| EngineError::from_imap("LOGOUT", e))
        })
        .await
    }
}

async fn connect_and_login(
    endpoint: &ImapEndpoint,
    credentials: &Credentials,
) -> EngineResult<TlsSession> {
    let mut root_store = RootCertStore::empty();
    let certs = load_native_certs()
        .map_err(|e| EngineError::Connectivity(format!("loading native certs: {e}")))?;
    for cert in certs {
        root_store
            .add(&tokio_rustls::rustls::Certificate(cert.0))
            .map_err(|e| EngineError::Connectivity(format!("adding root cert: {e}")))?;
    }

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| {
            EngineError::Connectivity(format!(
                "connecting to {}:{}: {e}",
                endpoint.host, endpoint.port
            ))
        })?;

    let server_name = ServerName::try_from(endpoint.host.as_str())
        .map_err(|_| EngineError::Connectivity(format!("invalid DNS name {}", endpoint.host)))?;
    let tls_stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| EngineError::Connectivity(format!("TLS handshake: {e}")))?;

    let mut client = Client::new(tls_stream.compat());
    client
        .read_response()
        .await
        .map_err(|e| EngineError::Connectivity(format!("reading IMAP greeting: {e}")))?
        .ok_or_else(|| {
            EngineError::Connectivity("unexpected end of stream, expected greeting".to_string())
        })?;

    client
        .login(&credentials.address, &credentials.secret)
        .await
        .map_err(|(err, _client)| login_error(err))
}

/// A LOGIN the server refuses is a credential problem, not a command failure.
fn login_error(err: async_imap::error::Error) -> EngineError {
    match EngineError::from_imap("LOGIN", err) {
        EngineError::Rejected { reason, .. } => EngineError::Authentication(reason),
        other => other,
    }
}

async fn with_timeout<T, F>(operation: &'static str, after: Duration, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout { operation, after }),
    }
}

/// Compress sorted UIDs into an IMAP sequence set, e.g. `1:5,7,10:15`.
pub fn build_uid_sequence(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let (mut start, mut end) = (first, first);
    for uid in iter {
        if uid == end + 1 {
            end = uid;
            continue;
        }
        parts.push(format_range(start, end));
        start = uid;
        end = uid;
    }
    parts.push(format_range(start, end));
    parts.join(",")
}

fn format_range(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}:{end}")
    }
}

fn quote_imap_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

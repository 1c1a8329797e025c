pub mod aggregate;
pub mod app;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod engine;
pub mod enumerate;
pub mod errors;
pub mod headers;
pub mod imap;
pub mod session;
pub mod types;

pub use aggregate::{aggregate, aggregate_cancellable, NoProgress, ScanObserver, ScanResult};
pub use cleanup::delete_by_sender;
pub use config::EngineConfig;
pub use engine::Engine;
pub use enumerate::{list_messages, MessageBatch, MessageCursor, MessageFilter};
pub use errors::{EngineError, EngineResult};
pub use headers::fetch_headers;
pub use session::Session;
pub use types::{
    Credentials, DeletionFailure, DeletionResult, MessageRef, ParsedHeader, ScanProgress,
    SenderKey, SenderStat,
};

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::errors::{EngineError, EngineResult};

const CONFIG_FILE_NAME: &str = "config.toml";
const MAX_BATCH_SIZE: usize = 1000;

/// Engine settings. Everything has a default; a config file and `CLEANMAIL_*`
/// env vars can override individual values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mailbox: String,
    pub batch_size: usize,
    pub delete_batch_size: usize,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mailbox: "INBOX".to_string(),
            batch_size: 100,
            delete_batch_size: 250,
            connect_timeout_secs: 30,
            command_timeout_secs: 120,
            host: None,
            port: None,
        }
    }
}

impl EngineConfig {
    pub fn load() -> EngineResult<Self> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "Loading config file");
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    EngineError::Config(format!("reading {}: {e}", path.display()))
                })?;
                Self::from_toml(&raw)?
            }
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config.normalized())
    }

    pub fn from_toml(raw: &str) -> EngineResult<Self> {
        toml::from_str::<Self>(raw)
            .map(Self::normalized)
            .map_err(|e| EngineError::Config(e.to_string()))
    }

    fn apply_env(&mut self) {
        if let Ok(mailbox) = env::var("CLEANMAIL_MAILBOX") {
            self.mailbox = mailbox;
        }
        if let Some(n) = env_parse("CLEANMAIL_BATCH_SIZE") {
            self.batch_size = n;
        }
        if let Some(n) = env_parse("CLEANMAIL_DELETE_BATCH_SIZE") {
            self.delete_batch_size = n;
        }
        if let Some(n) = env_parse("CLEANMAIL_CONNECT_TIMEOUT_SECS") {
            self.connect_timeout_secs = n;
        }
        if let Some(n) = env_parse("CLEANMAIL_COMMAND_TIMEOUT_SECS") {
            self.command_timeout_secs = n;
        }
        if let Ok(host) = env::var("CLEANMAIL_IMAP_HOST") {
            self.host = Some(host);
        }
        if let Some(port) = env_parse("CLEANMAIL_IMAP_PORT") {
            self.port = Some(port);
        }
    }

    fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.clamp(1, MAX_BATCH_SIZE);
        self.delete_batch_size = self.delete_batch_size.clamp(1, MAX_BATCH_SIZE);
        // A zero timeout would fail every round trip before it starts.
        self.connect_timeout_secs = self.connect_timeout_secs.max(1);
        self.command_timeout_secs = self.command_timeout_secs.max(1);
        if self.mailbox.trim().is_empty() {
            self.mailbox = "INBOX".to_string();
        }
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn config_file_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("CLEANMAIL_CONFIG") {
        return Some(PathBuf::from(custom));
    }
    dirs::config_dir().map(|dir| dir.join("cleanmail").join(CONFIG_FILE_NAME))
}

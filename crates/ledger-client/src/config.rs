//! Client configuration.

use crate::{LedgerError, LedgerResult, Paths};
use ledger_transport::{normalize_base, ws_url_from_http};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default gateway URL.
pub const DEFAULT_HTTP_BASE_URL: &str = "http://localhost:7575/";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Base URL of the gateway's HTTP endpoints.
    pub http_base_url: String,
    /// Base URL of the WebSocket endpoints; derived from `http_base_url` when unset.
    pub ws_base_url: Option<String>,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Also append JSONL logs to this file.
    pub log_file: Option<PathBuf>,
    /// Client ping interval on streams; `None` disables it.
    pub heartbeat_interval_secs: Option<u64>,
    pub request_timeout_secs: u64,
    /// Number of undelivered updates a stream holds before it stops reading.
    pub stream_buffer: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            http_base_url: DEFAULT_HTTP_BASE_URL.to_string(),
            ws_base_url: None,
            token: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
            heartbeat_interval_secs: Some(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl LedgerConfig {
    /// Create a new config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Defaults pointed at `http_base_url` with `token`.
    pub fn for_gateway(http_base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http_base_url: http_base_url.into(),
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Load configuration from a file, falling back to defaults.
    pub fn load(paths: &Paths) -> LedgerResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> LedgerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LedgerConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> LedgerResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `LEDGER_*` overrides looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("LEDGER_HTTP_BASE_URL") {
            self.http_base_url = url;
        }
        if let Some(url) = lookup("LEDGER_WS_BASE_URL") {
            self.ws_base_url = Some(url);
        }
        if let Some(token) = lookup("LEDGER_TOKEN") {
            self.token = Some(token);
        }
        if let Some(level) = lookup("LEDGER_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// The HTTP base URL, with a trailing slash.
    pub fn http_url(&self) -> LedgerResult<Url> {
        Ok(normalize_base(&self.http_base_url)?)
    }

    /// The WebSocket base URL, explicit or derived.
    pub fn ws_url(&self) -> LedgerResult<Url> {
        match &self.ws_base_url {
            Some(url) => Ok(normalize_base(url)?),
            None => Ok(ws_url_from_http(&self.http_url()?)?),
        }
    }

    pub fn token(&self) -> LedgerResult<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| LedgerError::Config("no token configured".to_string()))
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

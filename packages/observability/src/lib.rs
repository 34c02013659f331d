//! # Observability
//!
//! Logging setup for the ledger client crates. Library code only uses
//! `tracing` macros; a binary or test harness calls [`init`] or
//! [`init_with_config`] once to decide where the events go:
//!
//! - a compact human-readable layer on stderr,
//! - optionally, structured JSONL appended to a file.
//!
//! `RUST_LOG` overrides the configured level.
//!
//! ```rust,ignore
//! ledger_observability::init_with_config(ledger_observability::LogConfig {
//!     service_name: "ledger-client".into(),
//!     default_level: "debug".into(),
//!     log_path: ledger_observability::default_log_path(),
//!     ..Default::default()
//! })?;
//! ```

mod file;

pub use file::LogFileWriter;

use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Error, Debug)]
pub enum ObservabilityError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Reported in the startup line.
    pub service_name: String,

    /// Default filter (e.g. "debug", "info,ledger_stream=trace").
    pub default_level: String,

    /// Append JSONL to this file when set.
    pub log_path: Option<PathBuf>,

    /// Emit compact logs on stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "ledger-client".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// `~/.ledger-client/logs/client.jsonl`, when a home directory exists.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ledger-client").join("logs").join("client.jsonl"))
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install a stderr subscriber for `service_name` at the default level.
pub fn init(service_name: &str) -> Result<(), ObservabilityError> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Install the global subscriber described by `config`.
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init_with_config(config: LogConfig) -> Result<(), ObservabilityError> {
    let file_layer = match &config.log_path {
        Some(path) => {
            let writer = LogFileWriter::open(path).map_err(|source| ObservabilityError::LogFile {
                path: path.clone(),
                source,
            })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(writer)
                    .with_filter(env_filter(&config.default_level)),
            )
        }
        None => None,
    };

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    tracing::info!(
        service = %config.service_name,
        log_path = ?config.log_path,
        "observability initialized"
    );
    Ok(())
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, trace, warn, Level};

//! Logging initialization for applications using the client.
//!
//! The client crates only emit `tracing` events. Applications that do not
//! install their own subscriber can call [`init_logging`] once at startup.

use crate::{LedgerConfig, LedgerResult};
use ledger_observability::LogConfig;

/// Install the global subscriber from `config`.
///
/// Logs go to stderr, and to `config.log_file` as JSONL when set. `RUST_LOG`
/// takes precedence over `config.log_level`.
///
/// ```ignore
/// init_logging(&LedgerConfig::new())?;
/// tracing::info!("connected");
/// ```
pub fn init_logging(config: &LedgerConfig) -> LedgerResult<()> {
    init_logging_for_service("ledger-client", config)
}

/// Same as [`init_logging`] with a custom service name.
pub fn init_logging_for_service(service_name: &str, config: &LedgerConfig) -> LedgerResult<()> {
    ledger_observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: config.log_level.clone(),
        log_path: config.log_file.clone(),
        also_stderr: true,
    })?;
    Ok(())
}

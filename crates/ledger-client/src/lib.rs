//! # Ledger client
//!
//! Typed access to a ledger through its JSON gateway: commands, queries,
//! live streams and the party and package endpoints.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = LedgerConfig::for_gateway("http://localhost:7575", token);
//! init_logging(&config)?;
//! let ledger = Ledger::new(&config)?;
//!
//! let alice = ledger.create(&person, &payload).await?;
//! let mut stream = ledger.stream_query(&person, None).await?;
//! while let Some(update) = stream.next().await {
//!     tracing::info!(contracts = update.state().map(Vec::len), "update");
//! }
//! ```
//!
//! Configuration is read from `~/.ledger-client/config.json` and `LEDGER_*`
//! environment variables; see [`LedgerConfig`].

mod config;
mod error;
mod ledger;
mod logging;
mod package;
mod party;
mod paths;

pub use config::{
    LedgerConfig, DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_HTTP_BASE_URL, DEFAULT_LOG_LEVEL,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STREAM_BUFFER,
};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{KeyStream, KeysStream, Ledger, QueryStream};
pub use logging::{init_logging, init_logging_for_service};
pub use party::PartyInfo;
pub use paths::Paths;

pub use ledger_codec::{
    ArchiveEvent, Choice, Codec, CreateEvent, Event, Numeric, Query, Record, Schema, Template,
    TemplateId, TemplateRegistry, Value,
};
pub use ledger_stream::{CloseReason, LedgerStream, StreamError, StreamUpdate};
pub use ledger_transport::TransportError;

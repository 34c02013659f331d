//! Client error types.

use ledger_codec::{DecodeError, EncodeError};
use ledger_observability::ObservabilityError;
use ledger_stream::StreamError;
use ledger_transport::TransportError;
use thiserror::Error;

/// Error type for ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A response did not decode into the expected shape.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// An argument did not fit its declared shape.
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Home directory not found.
    #[error("Path error: {0}")]
    Path(String),

    #[error("Logging error: {0}")]
    Logging(#[from] ObservabilityError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The gateway answered with a well-formed but unexpected result.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl LedgerError {
    /// HTTP status of a failed gateway request.
    pub fn status(&self) -> Option<u16> {
        match self {
            LedgerError::Transport(TransportError::Request { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Error messages of a failed gateway request.
    pub fn errors(&self) -> &[String] {
        match self {
            LedgerError::Transport(TransportError::Request { errors, .. }) => errors,
            _ => &[],
        }
    }
}

/// Result type alias using LedgerError.
pub type LedgerResult<T> = Result<T, LedgerError>;

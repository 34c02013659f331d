//! Transport error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The gateway answered with a non-success status.
    ///
    /// `errors` holds the gateway's error messages and is never empty.
    #[error("request failed with status {status}: {}", .errors.join("; "))]
    Request { status: u16, errors: Vec<String> },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A response did not have the gateway's envelope shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed")]
    Closed,
}

pub type TransportResult<T> = Result<T, TransportError>;

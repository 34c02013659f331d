//! Stream error types.

use ledger_codec::DecodeError;
use ledger_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("undecodable frame: {0}")]
    Decode(#[from] DecodeError),

    /// The gateway reported errors or the connection failed.
    #[error("stream fault: {}", .0.join("; "))]
    Fault(Vec<String>),

    #[error("stream closed")]
    Closed,
}

pub type StreamResult<T> = Result<T, StreamError>;

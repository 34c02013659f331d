//! Transport to the ledger JSON gateway.
//!
//! [`HttpClient`] issues authenticated request/response calls and unwraps
//! the gateway's result envelope. [`WsClient`] opens authenticated
//! WebSocket connections whose frames arrive as [`WsEvent`]s.

mod error;
mod http;
mod ws;

pub use error::{TransportError, TransportResult};
pub use http::{error_messages, normalize_base, HttpClient, DEFAULT_REQUEST_TIMEOUT};
pub use ws::{ws_url_from_http, WsClient, WsCloser, WsConfig, WsConnection, WsEvent, AUTH_SUBPROTOCOL};

//! WebSocket client for the gateway's streaming endpoints.

use crate::error::{TransportError, TransportResult};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use url::Url;

/// Sub-protocol announcing token authentication.
pub const AUTH_SUBPROTOCOL: &str = "daml.ws.auth";

/// WebSocket client configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Ping interval; `None` disables the client heartbeat.
    pub heartbeat_interval: Option<Duration>,
    /// Capacity of the event channel.
    pub buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Some(Duration::from_secs(30)),
            buffer: 64,
        }
    }
}

/// Events emitted by a connection, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// The handshake completed.
    Open,
    /// An inbound text frame.
    Message(String),
    /// A transport error; a `Close` follows.
    Error(String),
    /// The connection ended. Always the last event.
    Close { code: Option<u16>, reason: String },
}

/// Closes a connection from anywhere. Cheap to clone; closing twice is a no-op.
#[derive(Debug, Clone)]
pub struct WsCloser {
    tx: Arc<watch::Sender<bool>>,
}

impl WsCloser {
    pub fn close(&self) {
        if !self.tx.send_replace(true) {
            debug!("WebSocket close requested");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

/// An open WebSocket connection.
///
/// A background task owns the socket. Inbound frames are delivered through a
/// bounded channel; when it is full the task stops reading from the socket.
#[derive(Debug)]
pub struct WsConnection {
    events: mpsc::Receiver<WsEvent>,
    outbound: mpsc::Sender<Message>,
    closer: WsCloser,
}

/// Stateless connector holding the credential.
#[derive(Debug, Clone)]
pub struct WsClient {
    base_url: Url,
    token: String,
    config: WsConfig,
}

impl WsClient {
    pub fn new(base_url: Url, token: impl Into<String>, config: WsConfig) -> Self {
        Self {
            base_url,
            token: token.into(),
            config,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Open a connection to `path` below the base URL.
    pub async fn connect(&self, path: &str) -> TransportResult<WsConnection> {
        let url = self.base_url.join(path)?;
        info!(%url, "Connecting WebSocket");

        let mut request = url.as_str().into_client_request()?;
        let protocols = format!("jwt.token.{}, {}", self.token, AUTH_SUBPROTOCOL);
        let header = HeaderValue::from_str(&protocols)
            .map_err(|e| TransportError::Protocol(format!("invalid token: {}", e)))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, header);

        let (ws_stream, _) = connect_async(request).await?;
        let (write, read) = ws_stream.split();

        let (event_tx, event_rx) = mpsc::channel(self.config.buffer.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(16);
        let (close_tx, close_rx) = watch::channel(false);

        let _ = event_tx.send(WsEvent::Open).await;

        let heartbeat = self.config.heartbeat_interval.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        tokio::spawn(async move {
            pump(write, read, event_tx, outbound_rx, close_rx, heartbeat).await;
            debug!("WebSocket task finished");
        });

        Ok(WsConnection {
            events: event_rx,
            outbound: outbound_tx,
            closer: WsCloser {
                tx: Arc::new(close_tx),
            },
        })
    }
}

/// Socket loop: forwards inbound frames, writes outbound ones and pings,
/// and always finishes by emitting exactly one `Close`.
async fn pump<W, R>(
    mut write: W,
    mut read: R,
    event_tx: mpsc::Sender<WsEvent>,
    mut outbound_rx: mpsc::Receiver<Message>,
    mut close_rx: watch::Receiver<bool>,
    mut heartbeat: Option<Interval>,
) where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut close_event = WsEvent::Close {
        code: None,
        reason: "connection ended".to_string(),
    };
    let mut client_close = false;

    loop {
        tokio::select! {
            _ = close_rx.changed() => {
                client_close = true;
                break;
            }
            Some(msg) = outbound_rx.recv() => {
                if let Err(e) = write.send(msg).await {
                    warn!(error = %e, "WebSocket send failed");
                    close_event = fault(&event_tx, e).await;
                    break;
                }
            }
            _ = heartbeat_tick(&mut heartbeat) => {
                if let Err(e) = write.send(Message::Ping(Default::default())).await {
                    warn!(error = %e, "WebSocket heartbeat failed");
                    close_event = fault(&event_tx, e).await;
                    break;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let event = WsEvent::Message(text.as_str().to_owned());
                    tokio::select! {
                        sent = event_tx.send(event) => {
                            if sent.is_err() {
                                client_close = true;
                                break;
                            }
                        }
                        _ = close_rx.changed() => {
                            client_close = true;
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by server");
                    if let Some(frame) = frame {
                        close_event = WsEvent::Close {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.as_str().to_owned(),
                        };
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    close_event = fault(&event_tx, e).await;
                    break;
                }
                None => break,
            }
        }
    }

    if client_close {
        let _ = write.send(Message::Close(None)).await;
        close_event = WsEvent::Close {
            code: Some(1000),
            reason: "closed by client".to_string(),
        };
    }
    let _ = write.close().await;
    let _ = event_tx.send(close_event).await;
}

/// Report a socket failure; returns the `Close` event that must follow it.
async fn fault(event_tx: &mpsc::Sender<WsEvent>, error: WsError) -> WsEvent {
    let reason = error.to_string();
    let _ = event_tx.send(WsEvent::Error(reason.clone())).await;
    WsEvent::Close { code: None, reason }
}

async fn heartbeat_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl WsConnection {
    /// Next event; `None` after `Close` has been delivered.
    pub async fn recv(&mut self) -> Option<WsEvent> {
        self.events.recv().await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> TransportResult<()> {
        let text: String = text.into();
        self.outbound
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Request a close. Idempotent; a `Close` event is still delivered.
    pub fn close(&self) {
        self.closer.close();
    }

    pub fn closer(&self) -> WsCloser {
        self.closer.clone()
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.closer.close();
    }
}

/// Derive the WebSocket base URL from the HTTP one.
pub fn ws_url_from_http(http: &Url) -> TransportResult<Url> {
    let scheme = match http.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(http.clone()),
        other => {
            return Err(TransportError::Protocol(format!(
                "cannot derive a WebSocket URL from scheme {}",
                other
            )))
        }
    };
    let mut url = http.clone();
    url.set_scheme(scheme)
        .map_err(|_| TransportError::Protocol(format!("cannot set scheme {}", scheme)))?;
    Ok(url)
}

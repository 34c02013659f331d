//! Async driver connecting a WebSocket to a [`Reconciler`].

use crate::engine::{CloseReason, Reconciler, StreamUpdate};
use crate::error::{StreamError, StreamResult};
use crate::frame::StreamFrame;
use crate::view::View;
use ledger_codec::TemplateRegistry;
use ledger_transport::{WsClient, WsConnection, WsEvent};
use serde_json::Value as Json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A live subscription.
///
/// Updates are pulled with [`LedgerStream::next`]. The driver task stops
/// reading the socket while the update queue is full.
#[derive(Debug)]
pub struct LedgerStream<S> {
    updates: mpsc::Receiver<StreamUpdate<S>>,
    close_tx: watch::Sender<bool>,
    closing: bool,
    finished: bool,
    driver: JoinHandle<()>,
}

impl<S: Send + 'static> LedgerStream<S> {
    /// Connect to `path`, send `request` and start reconciling into `view`.
    pub async fn open<V>(
        ws: &WsClient,
        path: &str,
        request: &Json,
        registry: TemplateRegistry,
        view: V,
        buffer: usize,
    ) -> StreamResult<Self>
    where
        V: View<State = S>,
    {
        let conn = ws.connect(path).await?;
        conn.send_text(request.to_string()).await?;
        debug!(path, "Stream request sent");

        let (update_tx, updates) = mpsc::channel(buffer.max(1));
        let (close_tx, close_rx) = watch::channel(false);
        let driver = tokio::spawn(drive(
            conn,
            Reconciler::new(view),
            registry,
            update_tx,
            close_rx,
        ));

        Ok(Self {
            updates,
            close_tx,
            closing: false,
            finished: false,
            driver,
        })
    }

    /// Next update, or `None` once the terminal `Closed` has been returned.
    ///
    /// After [`close`](Self::close) only the `Closed` update is returned.
    pub async fn next(&mut self) -> Option<StreamUpdate<S>> {
        if self.finished {
            return None;
        }
        loop {
            let update = self.updates.recv().await;
            match update {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(update @ StreamUpdate::Closed(_)) => {
                    self.finished = true;
                    return Some(update);
                }
                Some(_) if self.closing => continue,
                Some(update) => return Some(update),
            }
        }
    }

    /// Next `Live` or `Change` update; an ended stream is an error.
    pub async fn try_next(&mut self) -> StreamResult<StreamUpdate<S>> {
        match self.next().await {
            Some(StreamUpdate::Closed(CloseReason::Fault(err))) => Err(err),
            Some(StreamUpdate::Closed(_)) | None => Err(StreamError::Closed),
            Some(update) => Ok(update),
        }
    }

    /// Stop the stream. Idempotent; the `Closed` update is still delivered once.
    pub fn close(&mut self) {
        self.closing = true;
        self.close_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.finished || (self.driver.is_finished() && self.updates.is_empty())
    }
}

impl<S> Drop for LedgerStream<S> {
    fn drop(&mut self) {
        self.close_tx.send_replace(true);
    }
}

async fn drive<V: View>(
    mut conn: WsConnection,
    mut reconciler: Reconciler<V>,
    registry: TemplateRegistry,
    updates: mpsc::Sender<StreamUpdate<V::State>>,
    mut close_rx: watch::Receiver<bool>,
) {
    let mut transport_errors: Vec<String> = Vec::new();

    let reason = loop {
        tokio::select! {
            _ = close_rx.changed() => break CloseReason::Requested,
            event = conn.recv() => match event {
                Some(WsEvent::Open) => reconciler.on_open(),
                Some(WsEvent::Message(text)) => {
                    let outcome = StreamFrame::parse(&text, &registry)
                        .map_err(StreamError::from)
                        .and_then(|frame| reconciler.on_frame(frame));
                    match outcome {
                        Ok(Some(update)) => {
                            tokio::select! {
                                sent = updates.send(update) => {
                                    if sent.is_err() {
                                        break CloseReason::Requested;
                                    }
                                }
                                _ = close_rx.changed() => break CloseReason::Requested,
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            error!(error = %err, "Stream failed");
                            break CloseReason::Fault(err);
                        }
                    }
                }
                Some(WsEvent::Error(message)) => transport_errors.push(message),
                Some(WsEvent::Close { code, reason }) => {
                    if transport_errors.is_empty() {
                        break CloseReason::Ended { code, reason };
                    }
                    break CloseReason::Fault(StreamError::Fault(std::mem::take(&mut transport_errors)));
                }
                None => break CloseReason::Ended { code: None, reason: "connection dropped".to_string() },
            }
        }
    };

    info!(?reason, phase = ?reconciler.phase(), "Stream closing");
    conn.close();
    if let Some(update) = reconciler.close(reason) {
        let _ = updates.send(update).await;
    }
}

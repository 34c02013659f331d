//! Snapshot/live reconciliation state machine.

use crate::error::{StreamError, StreamResult};
use crate::frame::StreamFrame;
use crate::view::View;
use ledger_codec::Event;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Connecting,
    /// Receiving the active contract snapshot.
    CatchUp,
    Live,
    Closed,
}

/// Why a stream ended.
#[derive(Debug)]
pub enum CloseReason {
    /// `close()` was called.
    Requested,
    /// The server closed the connection.
    Ended { code: Option<u16>, reason: String },
    Fault(StreamError),
}

/// What a stream reports to its consumer.
#[derive(Debug)]
pub enum StreamUpdate<S> {
    /// The snapshot is complete; exactly once, before any change.
    Live(S),
    Change { state: S, events: Vec<Event> },
    /// Terminal; nothing follows it.
    Closed(CloseReason),
}

impl<S> StreamUpdate<S> {
    pub fn state(&self) -> Option<&S> {
        match self {
            StreamUpdate::Live(state) | StreamUpdate::Change { state, .. } => Some(state),
            StreamUpdate::Closed(_) => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, StreamUpdate::Closed(_))
    }
}

/// Folds frames into a view and decides what to emit.
///
/// Pure: given the same frames it produces the same updates.
#[derive(Debug)]
pub struct Reconciler<V: View> {
    view: V,
    phase: StreamPhase,
}

impl<V: View> Reconciler<V> {
    pub fn new(view: V) -> Self {
        Self {
            view,
            phase: StreamPhase::Connecting,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn state(&self) -> V::State {
        self.view.state()
    }

    pub fn on_open(&mut self) {
        if self.phase == StreamPhase::Connecting {
            self.phase = StreamPhase::CatchUp;
        }
    }

    /// Apply a frame. An `errors` frame is returned as a fault; the caller closes.
    pub fn on_frame(&mut self, frame: StreamFrame) -> StreamResult<Option<StreamUpdate<V::State>>> {
        if self.phase == StreamPhase::Closed {
            return Ok(None);
        }
        self.on_open();

        match frame {
            StreamFrame::Errors(errors) => Err(StreamError::Fault(errors)),
            StreamFrame::Warnings(warnings) => {
                warn!(%warnings, "Stream warnings");
                Ok(None)
            }
            StreamFrame::Events { events, offset } => match self.phase {
                StreamPhase::CatchUp => {
                    for event in &events {
                        self.view.apply(event);
                    }
                    match offset {
                        Some(offset) => {
                            debug!(offset = %offset.0, "Stream is live");
                            self.phase = StreamPhase::Live;
                            Ok(Some(StreamUpdate::Live(self.view.state())))
                        }
                        None => Ok(None),
                    }
                }
                _ => {
                    let reported: Vec<Event> = events
                        .into_iter()
                        .filter(|event| self.view.apply(event))
                        .collect();
                    if reported.is_empty() {
                        return Ok(None);
                    }
                    Ok(Some(StreamUpdate::Change {
                        state: self.view.state(),
                        events: reported,
                    }))
                }
            },
        }
    }

    /// Move to `Closed`. Returns the terminal update the first time only.
    pub fn close(&mut self, reason: CloseReason) -> Option<StreamUpdate<V::State>> {
        if self.phase == StreamPhase::Closed {
            return None;
        }
        self.phase = StreamPhase::Closed;
        Some(StreamUpdate::Closed(reason))
    }
}

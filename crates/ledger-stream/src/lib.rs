//! Reconciliation of ledger streams.
//!
//! A stream starts with a snapshot of the active contracts, followed by a
//! live marker and then incremental transactions. [`Reconciler`] folds the
//! frames into a [`View`] and emits one `Live` update when the snapshot is
//! complete and one `Change` per transaction after that. [`LedgerStream`]
//! drives a reconciler from a WebSocket connection.

mod engine;
mod error;
mod frame;
mod stream;
mod view;

pub use engine::{CloseReason, Reconciler, StreamPhase, StreamUpdate};
pub use error::{StreamError, StreamResult};
pub use frame::{Offset, StreamFrame};
pub use stream::LedgerStream;
pub use view::{KeyView, KeysView, QueryView, View};

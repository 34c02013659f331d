//! Typed values and their JSON encoding for the ledger gateway.
//!
//! This crate is pure: it performs no I/O. It provides
//!
//! - [`Value`], the typed representation of ledger data,
//! - [`Codec`] and [`Schema`] for decoding and encoding wire JSON,
//! - [`Template`] and [`Choice`] descriptors,
//! - [`Event`] decoding and [`Query`] predicates.

#![recursion_limit = "256"]

mod codec;
mod error;
mod event;
mod query;
mod template;
mod value;

pub use codec::{Codec, Schema, SchemaBuilder, TypeDef};
pub use error::{DecodeError, DecodeResult, EncodeError, EncodeResult, PathSegment, SchemaError};
pub use event::{ArchiveEvent, CreateEvent, Event};
pub use query::{matches_any, Query};
pub use template::{Choice, Template, TemplateBuilder, TemplateId, TemplateRegistry, ARCHIVE_CHOICE};
pub use value::{GenMap, Numeric, NumericError, Record, Value, MAX_NUMERIC_SCALE, NUMERIC_PRECISION};

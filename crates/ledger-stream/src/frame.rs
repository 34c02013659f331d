//! Inbound stream frames.

use ledger_codec::{DecodeError, DecodeResult, Event, TemplateRegistry};
use serde::Deserialize;
use serde_json::Value as Json;

/// Opaque ledger position. Only its presence is meaningful here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offset(pub String);

/// One decoded frame of a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Events, with an offset once the snapshot is complete.
    Events {
        events: Vec<Event>,
        offset: Option<Offset>,
    },
    Warnings(Json),
    Errors(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct FrameWire {
    #[serde(default)]
    events: Option<Vec<Json>>,
    // Present-but-null still counts as an offset.
    #[serde(default, deserialize_with = "present")]
    offset: Option<Json>,
    #[serde(default)]
    warnings: Option<Json>,
    #[serde(default)]
    errors: Option<Vec<Json>>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Json>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Json::deserialize(deserializer).map(Some)
}

impl StreamFrame {
    /// Parse a text frame, decoding events through `registry`.
    pub fn parse(text: &str, registry: &TemplateRegistry) -> DecodeResult<StreamFrame> {
        let wire: FrameWire =
            serde_json::from_str(text).map_err(|e| DecodeError::new(e.to_string()))?;

        if let Some(errors) = wire.errors {
            let messages = errors
                .into_iter()
                .map(|e| match e {
                    Json::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
            return Ok(StreamFrame::Errors(messages));
        }

        let offset = wire.offset.map(|o| match o {
            Json::String(s) => Offset(s),
            Json::Null => Offset(String::new()),
            other => Offset(other.to_string()),
        });

        match (wire.events, offset) {
            (Some(events), offset) => {
                let events = events
                    .iter()
                    .enumerate()
                    .map(|(i, e)| {
                        Event::from_wire(e, registry).map_err(|err| err.at_index(i).at_field("events"))
                    })
                    .collect::<DecodeResult<Vec<_>>>()?;
                Ok(StreamFrame::Events { events, offset })
            }
            (None, Some(offset)) => Ok(StreamFrame::Events {
                events: Vec::new(),
                offset: Some(offset),
            }),
            (None, None) => match wire.warnings {
                Some(warnings) => Ok(StreamFrame::Warnings(warnings)),
                None => Err(DecodeError::new("frame has neither events, offset, warnings nor errors")),
            },
        }
    }
}

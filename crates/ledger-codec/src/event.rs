//! Ledger events as reported by the gateway.

use crate::error::{DecodeError, DecodeResult};
use crate::template::{Template, TemplateId, TemplateRegistry};
use crate::value::Value;
use serde::Deserialize;
use serde_json::Value as Json;

/// An active contract, or the creation of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEvent {
    pub contract_id: String,
    pub template_id: TemplateId,
    pub payload: Value,
    pub key: Option<Value>,
    pub signatories: Vec<String>,
    pub observers: Vec<String>,
    pub agreement_text: Option<String>,
}

/// The archival of a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEvent {
    pub contract_id: String,
    pub template_id: TemplateId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Created(CreateEvent),
    Archived(ArchiveEvent),
}

impl Event {
    pub fn contract_id(&self) -> &str {
        match self {
            Event::Created(c) => &c.contract_id,
            Event::Archived(a) => &a.contract_id,
        }
    }

    pub fn template_id(&self) -> &TemplateId {
        match self {
            Event::Created(c) => &c.template_id,
            Event::Archived(a) => &a.template_id,
        }
    }

    pub fn as_created(&self) -> Option<&CreateEvent> {
        match self {
            Event::Created(c) => Some(c),
            Event::Archived(_) => None,
        }
    }

    pub fn as_archived(&self) -> Option<&ArchiveEvent> {
        match self {
            Event::Archived(a) => Some(a),
            Event::Created(_) => None,
        }
    }

    /// Decode a `{"created": ..}` or `{"archived": ..}` wrapper.
    pub fn from_wire(wire: &Json, registry: &TemplateRegistry) -> DecodeResult<Event> {
        let obj = wire
            .as_object()
            .ok_or_else(|| DecodeError::new("expected an event object"))?;
        if let Some(created) = obj.get("created") {
            let template_id = wire_template_id(created).map_err(|e| e.at_field("created"))?;
            let template = registry.lookup(&template_id).ok_or_else(|| {
                DecodeError::new(format!("unknown template {}", template_id)).at_field("created")
            })?;
            return CreateEvent::from_wire(created, template)
                .map(Event::Created)
                .map_err(|e| e.at_field("created"));
        }
        if let Some(archived) = obj.get("archived") {
            return ArchiveEvent::from_wire(archived)
                .map(Event::Archived)
                .map_err(|e| e.at_field("archived"));
        }
        Err(DecodeError::new(
            "expected an event with a created or archived field",
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedWire {
    contract_id: String,
    template_id: String,
    payload: Json,
    #[serde(default)]
    key: Option<Json>,
    #[serde(default)]
    signatories: Vec<String>,
    #[serde(default)]
    observers: Vec<String>,
    #[serde(default)]
    agreement_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArchivedWire {
    contract_id: String,
    template_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateIdWire {
    template_id: String,
}

fn parse_template_id(text: &str) -> DecodeResult<TemplateId> {
    text.parse()
        .map_err(|e: crate::error::SchemaError| DecodeError::new(e.to_string()).at_field("templateId"))
}

fn wire_template_id(wire: &Json) -> DecodeResult<TemplateId> {
    let dto = TemplateIdWire::deserialize(wire).map_err(|e| DecodeError::new(e.to_string()))?;
    parse_template_id(&dto.template_id)
}

impl CreateEvent {
    /// Decode an unwrapped created event of `template`.
    pub fn from_wire(wire: &Json, template: &Template) -> DecodeResult<CreateEvent> {
        let dto = CreatedWire::deserialize(wire).map_err(|e| DecodeError::new(e.to_string()))?;
        let template_id = parse_template_id(&dto.template_id)?;
        if !template.id().matches(&template_id) {
            return Err(DecodeError::new(format!(
                "expected a contract of {}, found {}",
                template.id(),
                template_id
            ))
            .at_field("templateId"));
        }
        let payload = template
            .decode_payload(&dto.payload)
            .map_err(|e| e.at_field("payload"))?;
        let key = match dto.key.as_ref().filter(|k| !k.is_null()) {
            Some(key) => template.decode_key(key).map_err(|e| e.at_field("key"))?,
            None => None,
        };
        Ok(CreateEvent {
            contract_id: dto.contract_id,
            template_id,
            payload,
            key,
            signatories: dto.signatories,
            observers: dto.observers,
            agreement_text: dto.agreement_text,
        })
    }
}

impl ArchiveEvent {
    pub fn from_wire(wire: &Json) -> DecodeResult<ArchiveEvent> {
        let dto = ArchivedWire::deserialize(wire).map_err(|e| DecodeError::new(e.to_string()))?;
        Ok(ArchiveEvent {
            template_id: parse_template_id(&dto.template_id)?,
            contract_id: dto.contract_id,
        })
    }
}

//! Template and choice descriptors.
//!
//! A [`Template`] binds a template id to the codecs of its payload, key and
//! choices. Descriptors are built once, up front, and the command and stream
//! layers marshal through them.

use crate::codec::{Codec, Schema};
use crate::error::{DecodeResult, EncodeError, EncodeResult, SchemaError};
use crate::value::Value;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Name of the choice every template has.
pub const ARCHIVE_CHOICE: &str = "Archive";

/// `[package:]Module.Path:Entity`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateId {
    pub package_id: Option<String>,
    pub module: String,
    pub entity: String,
}

impl TemplateId {
    pub fn new(module: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            package_id: None,
            module: module.into(),
            entity: entity.into(),
        }
    }

    pub fn with_package(mut self, package_id: impl Into<String>) -> Self {
        self.package_id = Some(package_id.into());
        self
    }

    /// Module and entity agree, and so do package ids when both are known.
    ///
    /// Requests usually name templates without a package id while the
    /// gateway always answers with one.
    pub fn matches(&self, other: &TemplateId) -> bool {
        self.module == other.module
            && self.entity == other.entity
            && match (&self.package_id, &other.package_id) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

impl FromStr for TemplateId {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (package_id, module, entity) = match parts.as_slice() {
            [module, entity] => (None, *module, *entity),
            [package, module, entity] if !package.is_empty() => {
                (Some(package.to_string()), *module, *entity)
            }
            _ => return Err(SchemaError::InvalidTemplateId(s.to_string())),
        };
        if module.is_empty() || entity.is_empty() {
            return Err(SchemaError::InvalidTemplateId(s.to_string()));
        }
        Ok(Self {
            package_id,
            module: module.to_string(),
            entity: entity.to_string(),
        })
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package_id {
            Some(package) => write!(f, "{}:{}:{}", package, self.module, self.entity),
            None => write!(f, "{}:{}", self.module, self.entity),
        }
    }
}

#[derive(Debug)]
struct ChoiceDef {
    argument: Codec,
    result: Codec,
}

#[derive(Debug)]
struct TemplateInner {
    id: TemplateId,
    schema: Arc<Schema>,
    payload: Codec,
    key: Option<Codec>,
    choices: HashMap<String, ChoiceDef>,
}

/// Descriptor of one template. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Template {
    inner: Arc<TemplateInner>,
}

/// Builder for [`Template`].
#[derive(Debug)]
pub struct TemplateBuilder {
    inner: TemplateInner,
}

impl TemplateBuilder {
    pub fn key(mut self, key: Codec) -> Self {
        self.inner.key = Some(key);
        self
    }

    pub fn choice(mut self, name: impl Into<String>, argument: Codec, result: Codec) -> Self {
        self.inner
            .choices
            .insert(name.into(), ChoiceDef { argument, result });
        self
    }

    pub fn build(mut self) -> Template {
        self.inner
            .choices
            .entry(ARCHIVE_CHOICE.to_string())
            .or_insert(ChoiceDef {
                argument: Codec::Unit,
                result: Codec::Unit,
            });
        Template {
            inner: Arc::new(self.inner),
        }
    }
}

impl Template {
    pub fn builder(id: TemplateId, schema: Arc<Schema>, payload: Codec) -> TemplateBuilder {
        TemplateBuilder {
            inner: TemplateInner {
                id,
                schema,
                payload,
                key: None,
                choices: HashMap::new(),
            },
        }
    }

    pub fn id(&self) -> &TemplateId {
        &self.inner.id
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn has_key(&self) -> bool {
        self.inner.key.is_some()
    }

    /// Look up a choice by name. `Archive` is always present.
    pub fn choice(&self, name: &str) -> Option<Choice> {
        self.inner.choices.contains_key(name).then(|| Choice {
            template: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn decode_payload(&self, wire: &Json) -> DecodeResult<Value> {
        self.inner.schema.decode(&self.inner.payload, wire)
    }

    pub fn encode_payload(&self, payload: &Value) -> EncodeResult<Json> {
        self.inner.schema.encode(&self.inner.payload, payload)
    }

    /// Decode a key; templates without a key decode nothing.
    pub fn decode_key(&self, wire: &Json) -> DecodeResult<Option<Value>> {
        match &self.inner.key {
            Some(codec) => self.inner.schema.decode(codec, wire).map(Some),
            None => Ok(None),
        }
    }

    pub fn encode_key(&self, key: &Value) -> EncodeResult<Json> {
        let codec = self
            .inner
            .key
            .as_ref()
            .ok_or_else(|| EncodeError::new(format!("template {} has no key", self.id())))?;
        self.inner.schema.encode(codec, key)
    }
}

/// A choice of a template.
#[derive(Debug, Clone)]
pub struct Choice {
    template: Template,
    name: String,
}

impl Choice {
    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn def(&self) -> Option<&ChoiceDef> {
        self.template.inner.choices.get(&self.name)
    }

    pub fn encode_argument(&self, argument: &Value) -> EncodeResult<Json> {
        let def = self
            .def()
            .ok_or_else(|| EncodeError::new(format!("unknown choice {}", self.name)))?;
        self.template.schema().encode(&def.argument, argument)
    }

    pub fn decode_result(&self, wire: &Json) -> DecodeResult<Value> {
        match self.def() {
            Some(def) => self.template.schema().decode(&def.result, wire),
            None => Err(crate::error::DecodeError::new(format!(
                "unknown choice {}",
                self.name
            ))),
        }
    }
}

/// Templates known to a client, used to decode events of any of them.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing an earlier one with the same id.
    pub fn register(&mut self, template: Template) {
        self.templates.retain(|t| t.id() != template.id());
        self.templates.push(template);
    }

    pub fn with(mut self, template: Template) -> Self {
        self.register(template);
        self
    }

    pub fn lookup(&self, id: &TemplateId) -> Option<&Template> {
        self.templates.iter().find(|t| t.id().matches(id))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl From<Template> for TemplateRegistry {
    fn from(template: Template) -> Self {
        TemplateRegistry::new().with(template)
    }
}

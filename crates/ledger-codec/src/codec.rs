//! Shape codecs between [`Value`] and the gateway's JSON encoding.
//!
//! A [`Codec`] describes one data shape. Records, variants and enums are
//! declared once in a [`Schema`] and referenced by name, which is how
//! recursive shapes are expressed. Decoding is driven by the wire value:
//! before descending into a named shape the wire value's JSON kind is
//! checked, so recursion depth never exceeds the nesting of the input.

use crate::error::{DecodeError, DecodeResult, EncodeError, EncodeResult, PathSegment, SchemaError};
use crate::value::{GenMap, Numeric, Record, Value, MAX_NUMERIC_SCALE};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Value as Json};
use std::collections::{BTreeMap, HashMap, HashSet};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One data shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    Unit,
    Bool,
    Int64,
    /// Fixed-scale decimal.
    Numeric(u8),
    Text,
    Date,
    Timestamp,
    Party,
    ContractId,
    Optional(Box<Codec>),
    List(Box<Codec>),
    TextMap(Box<Codec>),
    GenMap(Box<Codec>, Box<Codec>),
    /// A record, variant or enum declared in the schema.
    Named(String),
}

impl Codec {
    pub fn optional(inner: Codec) -> Self {
        Codec::Optional(Box::new(inner))
    }

    pub fn list(element: Codec) -> Self {
        Codec::List(Box::new(element))
    }

    pub fn text_map(value: Codec) -> Self {
        Codec::TextMap(Box::new(value))
    }

    pub fn gen_map(key: Codec, value: Codec) -> Self {
        Codec::GenMap(Box::new(key), Box::new(value))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Codec::Named(name.into())
    }

    fn is_optional(&self) -> bool {
        matches!(self, Codec::Optional(_))
    }
}

/// Definition of a named shape.
#[derive(Debug, Clone)]
pub enum TypeDef {
    /// Fields in declaration order.
    Record(Vec<(String, Codec)>),
    /// Constructor dispatch table keyed by tag.
    Variant(BTreeMap<String, Codec>),
    /// Constructor names.
    Enum(Vec<String>),
}

/// Collects type definitions and validates them into a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    defs: HashMap<String, TypeDef>,
    duplicates: Vec<String>,
}

impl SchemaBuilder {
    fn define(mut self, name: String, def: TypeDef) -> Self {
        if self.defs.insert(name.clone(), def).is_some() {
            self.duplicates.push(name);
        }
        self
    }

    pub fn record<K: Into<String>>(
        self,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (K, Codec)>,
    ) -> Self {
        let fields = fields.into_iter().map(|(k, c)| (k.into(), c)).collect();
        self.define(name.into(), TypeDef::Record(fields))
    }

    pub fn variant<K: Into<String>>(
        self,
        name: impl Into<String>,
        constructors: impl IntoIterator<Item = (K, Codec)>,
    ) -> Self {
        let constructors = constructors
            .into_iter()
            .map(|(k, c)| (k.into(), c))
            .collect();
        self.define(name.into(), TypeDef::Variant(constructors))
    }

    pub fn enumeration<K: Into<String>>(
        self,
        name: impl Into<String>,
        constructors: impl IntoIterator<Item = K>,
    ) -> Self {
        let constructors = constructors.into_iter().map(Into::into).collect();
        self.define(name.into(), TypeDef::Enum(constructors))
    }

    /// Validate references and scales, and work out which shapes have at
    /// least one finite value.
    pub fn build(self) -> Result<Schema, SchemaError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(SchemaError::DuplicateType(name));
        }
        for (name, def) in &self.defs {
            for codec in def_codecs(def) {
                check_codec(&self.defs, name, codec)?;
            }
        }
        let inhabited = compute_inhabited(&self.defs);
        Ok(Schema {
            defs: self.defs,
            inhabited,
        })
    }
}

fn def_codecs(def: &TypeDef) -> Vec<&Codec> {
    match def {
        TypeDef::Record(fields) => fields.iter().map(|(_, c)| c).collect(),
        TypeDef::Variant(ctors) => ctors.values().collect(),
        TypeDef::Enum(_) => Vec::new(),
    }
}

fn check_codec(defs: &HashMap<String, TypeDef>, from: &str, codec: &Codec) -> Result<(), SchemaError> {
    match codec {
        Codec::Numeric(scale) if *scale > MAX_NUMERIC_SCALE => Err(SchemaError::InvalidScale(*scale)),
        Codec::Optional(inner) | Codec::List(inner) | Codec::TextMap(inner) => {
            check_codec(defs, from, inner)
        }
        Codec::GenMap(k, v) => {
            check_codec(defs, from, k)?;
            check_codec(defs, from, v)
        }
        Codec::Named(name) if !defs.contains_key(name) => Err(SchemaError::UndefinedType {
            from: from.to_string(),
            referenced: name.clone(),
        }),
        _ => Ok(()),
    }
}

fn codec_inhabited(codec: &Codec, inhabited: &HashSet<String>) -> bool {
    match codec {
        Codec::Named(name) => inhabited.contains(name),
        // None, [] and {} always exist
        _ => true,
    }
}

fn compute_inhabited(defs: &HashMap<String, TypeDef>) -> HashSet<String> {
    let mut inhabited = HashSet::new();
    loop {
        let mut changed = false;
        for (name, def) in defs {
            if inhabited.contains(name) {
                continue;
            }
            let has_value = match def {
                TypeDef::Record(fields) => fields.iter().all(|(_, c)| codec_inhabited(c, &inhabited)),
                TypeDef::Variant(ctors) => ctors.values().any(|c| codec_inhabited(c, &inhabited)),
                TypeDef::Enum(ctors) => !ctors.is_empty(),
            };
            if has_value {
                inhabited.insert(name.clone());
                changed = true;
            }
        }
        if !changed {
            return inhabited;
        }
    }
}

/// JSON kinds a codec can accept, checked before any descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireKind {
    Any,
    Object,
    Array,
    String,
    Bool,
    StringOrInteger,
}

fn json_kind(wire: &Json) -> &'static str {
    match wire {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn kind_accepts(kind: WireKind, wire: &Json) -> bool {
    match kind {
        WireKind::Any => true,
        WireKind::Object => wire.is_object(),
        WireKind::Array => wire.is_array(),
        WireKind::String => wire.is_string(),
        WireKind::Bool => wire.is_boolean(),
        WireKind::StringOrInteger => wire.is_string() || wire.is_i64() || wire.is_u64(),
    }
}

fn kind_name(kind: WireKind) -> &'static str {
    match kind {
        WireKind::Any => "any value",
        WireKind::Object => "an object",
        WireKind::Array => "an array",
        WireKind::String => "a string",
        WireKind::Bool => "a boolean",
        WireKind::StringOrInteger => "a string or an integer",
    }
}

/// A validated set of named shapes.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    defs: HashMap<String, TypeDef>,
    inhabited: HashSet<String>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// A schema without named shapes, enough for primitive codecs.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.defs.get(name)
    }

    /// Whether any finite value of `codec` exists.
    pub fn is_inhabited(&self, codec: &Codec) -> bool {
        codec_inhabited(codec, &self.inhabited)
    }

    fn wire_kind(&self, codec: &Codec) -> WireKind {
        match codec {
            Codec::Unit | Codec::TextMap(_) => WireKind::Object,
            Codec::Bool => WireKind::Bool,
            Codec::Int64 | Codec::Numeric(_) => WireKind::StringOrInteger,
            Codec::Text | Codec::Date | Codec::Timestamp | Codec::Party | Codec::ContractId => {
                WireKind::String
            }
            Codec::Optional(_) => WireKind::Any,
            Codec::List(_) | Codec::GenMap(_, _) => WireKind::Array,
            Codec::Named(name) => match self.defs.get(name) {
                Some(TypeDef::Record(_)) | Some(TypeDef::Variant(_)) => WireKind::Object,
                Some(TypeDef::Enum(_)) => WireKind::String,
                None => WireKind::Any,
            },
        }
    }

    /// Decode a wire value into a typed value.
    pub fn decode(&self, codec: &Codec, wire: &Json) -> DecodeResult<Value> {
        let kind = self.wire_kind(codec);
        if !kind_accepts(kind, wire) {
            return Err(DecodeError::new(format!(
                "expected {}, found {}",
                kind_name(kind),
                json_kind(wire)
            )));
        }

        match codec {
            Codec::Unit => match wire.as_object() {
                Some(obj) if obj.is_empty() => Ok(Value::Unit),
                _ => Err(DecodeError::new("expected an empty object for unit")),
            },
            Codec::Bool => Ok(Value::Bool(wire.as_bool().unwrap_or_default())),
            Codec::Int64 => decode_int64(wire),
            Codec::Numeric(scale) => decode_numeric(wire, *scale),
            Codec::Text => Ok(Value::Text(as_string(wire)?.to_string())),
            Codec::Party => Ok(Value::Party(as_string(wire)?.to_string())),
            Codec::ContractId => Ok(Value::ContractId(as_string(wire)?.to_string())),
            Codec::Date => {
                let text = as_string(wire)?;
                NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .map(Value::Date)
                    .map_err(|e| DecodeError::new(format!("invalid date {:?}: {}", text, e)))
            }
            Codec::Timestamp => {
                let text = as_string(wire)?;
                DateTime::parse_from_rfc3339(text)
                    .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
                    .map_err(|e| DecodeError::new(format!("invalid timestamp {:?}: {}", text, e)))
            }
            Codec::Optional(inner) => {
                if wire.is_null() {
                    Ok(Value::Optional(None))
                } else if inner.is_optional() {
                    Ok(Value::some(self.decode_nested_optional(inner, wire)?))
                } else {
                    Ok(Value::some(self.decode(inner, wire)?))
                }
            }
            Codec::List(element) => {
                let items = wire.as_array().map(Vec::as_slice).unwrap_or_default();
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.decode(element, item).map_err(|e| e.at_index(i)))
                    .collect::<DecodeResult<Vec<_>>>()
                    .map(Value::List)
            }
            Codec::TextMap(value) => {
                let mut map = BTreeMap::new();
                for (key, item) in wire.as_object().into_iter().flatten() {
                    let decoded = self
                        .decode(value, item)
                        .map_err(|e| e.at(PathSegment::Key(key.clone())))?;
                    map.insert(key.clone(), decoded);
                }
                Ok(Value::TextMap(map))
            }
            Codec::GenMap(key_codec, value_codec) => {
                let mut map = GenMap::new();
                let entries = wire.as_array().map(Vec::as_slice).unwrap_or_default();
                for (i, entry) in entries.iter().enumerate() {
                    let pair = match entry.as_array() {
                        Some(pair) if pair.len() == 2 => pair,
                        _ => {
                            return Err(DecodeError::new("expected a [key, value] pair").at_index(i))
                        }
                    };
                    let key = self
                        .decode(key_codec, &pair[0])
                        .map_err(|e| e.at_index(0).at_index(i))?;
                    let value = self
                        .decode(value_codec, &pair[1])
                        .map_err(|e| e.at_index(1).at_index(i))?;
                    map.insert(key, value);
                }
                Ok(Value::GenMap(map))
            }
            Codec::Named(name) => self.decode_named(name, wire),
        }
    }

    /// Decode the payload of `Some` for an optional whose inner shape is
    /// itself optional: `[]` is `None`, `[x]` is `Some(x)`.
    fn decode_nested_optional(&self, codec: &Codec, wire: &Json) -> DecodeResult<Value> {
        let inner = match codec {
            Codec::Optional(inner) => inner,
            _ => return self.decode(codec, wire),
        };
        match wire.as_array().map(Vec::as_slice) {
            Some([]) => Ok(Value::Optional(None)),
            Some([item]) => {
                let decoded = if inner.is_optional() {
                    self.decode_nested_optional(inner, item)
                } else {
                    self.decode(inner, item)
                };
                decoded.map(Value::some).map_err(|e| e.at_index(0))
            }
            _ => Err(DecodeError::new(format!(
                "expected [] or a one-element array for a nested optional, found {}",
                json_kind(wire)
            ))),
        }
    }

    fn decode_named(&self, name: &str, wire: &Json) -> DecodeResult<Value> {
        let def = self
            .defs
            .get(name)
            .ok_or_else(|| DecodeError::new(format!("undefined type {}", name)))?;
        if !self.inhabited.contains(name) {
            return Err(DecodeError::new(format!("type {} has no values", name)));
        }

        match def {
            TypeDef::Record(fields) => {
                let obj = as_object(wire)?;
                if let Some(extra) = obj.keys().find(|k| !fields.iter().any(|(f, _)| f == *k)) {
                    return Err(DecodeError::new(format!("unexpected field in {}", name)).at_field(extra));
                }
                let mut record = Record::new();
                for (field, codec) in fields {
                    let item = obj.get(field).ok_or_else(|| {
                        DecodeError::new(format!("missing field of {}", name)).at_field(field)
                    })?;
                    let value = self.decode(codec, item).map_err(|e| e.at_field(field))?;
                    record.insert(field.clone(), value);
                }
                Ok(Value::Record(record))
            }
            TypeDef::Variant(ctors) => {
                let obj = as_object(wire)?;
                if obj.len() != 2 || !obj.contains_key("value") {
                    return Err(DecodeError::new(format!(
                        "expected {{\"tag\", \"value\"}} for variant {}",
                        name
                    )));
                }
                let tag = obj
                    .get("tag")
                    .and_then(Json::as_str)
                    .ok_or_else(|| DecodeError::new("expected a string tag").at_field("tag"))?;
                let codec = ctors.get(tag).ok_or_else(|| {
                    DecodeError::new(format!("unknown constructor {} of {}", tag, name)).at_field("tag")
                })?;
                let value = obj.get("value").unwrap_or(&Json::Null);
                let decoded = self.decode(codec, value).map_err(|e| e.at_field("value"))?;
                Ok(Value::variant(tag, decoded))
            }
            TypeDef::Enum(ctors) => {
                let text = as_string(wire)?;
                if ctors.iter().any(|c| c == text) {
                    Ok(Value::Enum(text.to_string()))
                } else {
                    Err(DecodeError::new(format!("unknown constructor {} of {}", text, name)))
                }
            }
        }
    }

    /// Encode a typed value into its wire form.
    pub fn encode(&self, codec: &Codec, value: &Value) -> EncodeResult<Json> {
        match (codec, value) {
            (Codec::Unit, Value::Unit) => Ok(Json::Object(Map::new())),
            (Codec::Unit, Value::Record(r)) if r.is_empty() => Ok(Json::Object(Map::new())),
            (Codec::Bool, Value::Bool(b)) => Ok(Json::Bool(*b)),
            (Codec::Int64, Value::Int64(i)) => Ok(Json::String(i.to_string())),
            (Codec::Numeric(scale), Value::Numeric(n)) => {
                n.check_scale(*scale)
                    .map_err(|e| EncodeError::new(e.to_string()))?;
                Ok(Json::String(n.as_str().to_string()))
            }
            (Codec::Text, Value::Text(s))
            | (Codec::Party, Value::Party(s))
            | (Codec::ContractId, Value::ContractId(s)) => Ok(Json::String(s.clone())),
            (Codec::Date, Value::Date(d)) => Ok(Json::String(d.format(DATE_FORMAT).to_string())),
            (Codec::Timestamp, Value::Timestamp(t)) => {
                Ok(Json::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            }
            (Codec::Optional(_), Value::Optional(None)) => Ok(Json::Null),
            (Codec::Optional(inner), Value::Optional(Some(v))) => {
                if inner.is_optional() {
                    self.encode_nested_optional(inner, v)
                } else {
                    self.encode(inner, v)
                }
            }
            (Codec::List(element), Value::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    self.encode(element, item)
                        .map_err(|e| e.at(PathSegment::Index(i)))
                })
                .collect::<EncodeResult<Vec<_>>>()
                .map(Json::Array),
            (Codec::TextMap(value_codec), Value::TextMap(map)) => {
                let mut obj = Map::new();
                for (key, item) in map {
                    let encoded = self
                        .encode(value_codec, item)
                        .map_err(|e| e.at(PathSegment::Key(key.clone())))?;
                    obj.insert(key.clone(), encoded);
                }
                Ok(Json::Object(obj))
            }
            (Codec::GenMap(key_codec, value_codec), Value::GenMap(map)) => map
                .iter()
                .enumerate()
                .map(|(i, (k, v))| {
                    let pair = || -> EncodeResult<Json> {
                        let key = self.encode(key_codec, k)?;
                        let value = self.encode(value_codec, v)?;
                        Ok(Json::Array(vec![key, value]))
                    };
                    pair().map_err(|e| e.at(PathSegment::Index(i)))
                })
                .collect::<EncodeResult<Vec<_>>>()
                .map(Json::Array),
            (Codec::Named(name), value) => self.encode_named(name, value),
            (codec, value) => Err(EncodeError::new(format!(
                "cannot encode a {} value as {:?}",
                value.kind(),
                codec
            ))),
        }
    }

    fn encode_nested_optional(&self, codec: &Codec, value: &Value) -> EncodeResult<Json> {
        let inner = match codec {
            Codec::Optional(inner) => inner,
            _ => return self.encode(codec, value),
        };
        match value {
            Value::Optional(None) => Ok(Json::Array(Vec::new())),
            Value::Optional(Some(v)) => {
                let encoded = if inner.is_optional() {
                    self.encode_nested_optional(inner, v)?
                } else {
                    self.encode(inner, v)?
                };
                Ok(Json::Array(vec![encoded]))
            }
            other => Err(EncodeError::new(format!(
                "expected an optional value, found {}",
                other.kind()
            ))),
        }
    }

    fn encode_named(&self, name: &str, value: &Value) -> EncodeResult<Json> {
        let def = self
            .defs
            .get(name)
            .ok_or_else(|| EncodeError::new(format!("undefined type {}", name)))?;

        match (def, value) {
            (TypeDef::Record(fields), Value::Record(record)) => {
                if let Some((extra, _)) = record
                    .fields()
                    .find(|(n, _)| !fields.iter().any(|(f, _)| f.as_str() == *n))
                {
                    return Err(EncodeError::new(format!("unexpected field in {}", name))
                        .at(PathSegment::Field(extra.to_string())));
                }
                let mut obj = Map::new();
                for (field, codec) in fields {
                    let item = record.get(field).ok_or_else(|| {
                        EncodeError::new(format!("missing field of {}", name))
                            .at(PathSegment::Field(field.clone()))
                    })?;
                    let encoded = self
                        .encode(codec, item)
                        .map_err(|e| e.at(PathSegment::Field(field.clone())))?;
                    obj.insert(field.clone(), encoded);
                }
                Ok(Json::Object(obj))
            }
            (TypeDef::Record(fields), Value::Unit) if fields.is_empty() => Ok(Json::Object(Map::new())),
            (TypeDef::Variant(ctors), Value::Variant { constructor, value }) => {
                let codec = ctors.get(constructor).ok_or_else(|| {
                    EncodeError::new(format!("unknown constructor {} of {}", constructor, name))
                })?;
                let encoded = self
                    .encode(codec, value)
                    .map_err(|e| e.at(PathSegment::Field("value".to_string())))?;
                let mut obj = Map::new();
                obj.insert("tag".to_string(), Json::String(constructor.clone()));
                obj.insert("value".to_string(), encoded);
                Ok(Json::Object(obj))
            }
            (TypeDef::Enum(ctors), Value::Enum(constructor)) => {
                if ctors.contains(constructor) {
                    Ok(Json::String(constructor.clone()))
                } else {
                    Err(EncodeError::new(format!(
                        "unknown constructor {} of {}",
                        constructor, name
                    )))
                }
            }
            (_, value) => Err(EncodeError::new(format!(
                "cannot encode a {} value as {}",
                value.kind(),
                name
            ))),
        }
    }
}

fn as_string(wire: &Json) -> DecodeResult<&str> {
    wire.as_str()
        .ok_or_else(|| DecodeError::new(format!("expected a string, found {}", json_kind(wire))))
}

fn as_object(wire: &Json) -> DecodeResult<&Map<String, Json>> {
    wire.as_object()
        .ok_or_else(|| DecodeError::new(format!("expected an object, found {}", json_kind(wire))))
}

fn decode_int64(wire: &Json) -> DecodeResult<Value> {
    match wire {
        Json::String(text) => text
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| DecodeError::new(format!("invalid int64 {:?}: {}", text, e))),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Int64)
            .ok_or_else(|| DecodeError::new(format!("{} is not an int64", n))),
        other => Err(DecodeError::new(format!(
            "expected an int64, found {}",
            json_kind(other)
        ))),
    }
}

fn decode_numeric(wire: &Json, scale: u8) -> DecodeResult<Value> {
    // Fractional JSON numbers are binary floats by the time they reach us,
    // so only strings and integers are accepted.
    let text = match wire {
        Json::String(text) => text.clone(),
        Json::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        other => {
            return Err(DecodeError::new(format!(
                "expected a numeric string, found {}",
                json_kind(other)
            )))
        }
    };
    Numeric::with_scale(&text, scale)
        .map(Value::Numeric)
        .map_err(|e| DecodeError::new(e.to_string()))
}

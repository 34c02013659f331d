//! Query predicates.
//!
//! A predicate is a JSON object. Its fields are AND'd and each is matched
//! against the contract payload: a literal matches by equality (records
//! partially), an object of `%`-operators compares by order. The gateway
//! evaluates the same predicates; the local evaluation is used to decide
//! whether a created event seen on a stream belongs to the view.

use crate::value::{Numeric, Value};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    fields: Map<String, Json>,
}

impl Query {
    /// The predicate matching every contract.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a field constraint.
    pub fn field(mut self, name: impl Into<String>, constraint: Json) -> Self {
        self.fields.insert(name.into(), constraint);
        self
    }

    /// Build from a JSON object; anything else is not a predicate.
    pub fn from_json(json: Json) -> Option<Self> {
        match json {
            Json::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Json {
        Json::Object(self.fields.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn matches(&self, payload: &Value) -> bool {
        match payload {
            Value::Record(record) => self.fields.iter().all(|(name, constraint)| {
                record
                    .get(name)
                    .is_some_and(|value| constraint_matches(constraint, value))
            }),
            _ => self.fields.is_empty(),
        }
    }
}

/// OR over predicates; an empty list matches everything.
pub fn matches_any(queries: &[Query], payload: &Value) -> bool {
    queries.is_empty() || queries.iter().any(|q| q.matches(payload))
}

fn is_comparison(constraint: &Json) -> bool {
    match constraint {
        Json::Object(obj) => !obj.is_empty() && obj.keys().all(|k| k.starts_with('%')),
        _ => false,
    }
}

fn constraint_matches(constraint: &Json, value: &Value) -> bool {
    match constraint {
        Json::Object(ops) if is_comparison(constraint) && !matches!(value, Value::Record(_)) => {
            ops.iter().all(|(op, bound)| comparison_holds(op, bound, value))
        }
        _ => literal_matches(constraint, value),
    }
}

fn comparison_holds(op: &str, bound: &Json, value: &Value) -> bool {
    let accept: fn(Ordering) -> bool = match op {
        "%lt" => |o| o == Ordering::Less,
        "%lte" => |o| o != Ordering::Greater,
        "%gt" => |o| o == Ordering::Greater,
        "%gte" => |o| o != Ordering::Less,
        // Other operators are left to the gateway.
        _ => return true,
    };
    compare(value, bound).is_some_and(accept)
}

fn compare(value: &Value, bound: &Json) -> Option<Ordering> {
    match value {
        Value::Int64(i) => json_i64(bound).map(|b| i.cmp(&b)),
        Value::Numeric(n) => json_numeric(bound).map(|b| n.cmp(&b)),
        Value::Date(d) => json_date(bound).map(|b| d.cmp(&b)),
        Value::Timestamp(t) => json_timestamp(bound).map(|b| t.cmp(&b)),
        Value::Text(s) | Value::Party(s) => bound.as_str().map(|b| s.as_str().cmp(b)),
        Value::Optional(Some(inner)) => compare(inner, bound),
        _ => None,
    }
}

fn json_i64(json: &Json) -> Option<i64> {
    match json {
        Json::String(s) => s.parse().ok(),
        Json::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn json_numeric(json: &Json) -> Option<Numeric> {
    match json {
        Json::String(s) => Numeric::parse(s).ok(),
        Json::Number(n) => Numeric::parse(&n.to_string()).ok(),
        _ => None,
    }
}

fn json_date(json: &Json) -> Option<NaiveDate> {
    json.as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn json_timestamp(json: &Json) -> Option<DateTime<Utc>> {
    json.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn literal_matches(literal: &Json, value: &Value) -> bool {
    match value {
        Value::Unit => literal.as_object().is_some_and(|o| o.is_empty()),
        Value::Bool(b) => literal.as_bool() == Some(*b),
        Value::Int64(i) => json_i64(literal) == Some(*i),
        Value::Numeric(n) => json_numeric(literal).as_ref() == Some(n),
        Value::Date(d) => json_date(literal) == Some(*d),
        Value::Timestamp(t) => json_timestamp(literal) == Some(*t),
        Value::Text(s) | Value::Party(s) | Value::ContractId(s) | Value::Enum(s) => {
            literal.as_str() == Some(s.as_str())
        }
        Value::Optional(None) => literal.is_null(),
        Value::Optional(Some(inner)) => match inner.as_ref() {
            Value::Optional(nested) => nested_optional_matches(literal, nested.as_deref()),
            _ => !literal.is_null() && constraint_matches(literal, inner),
        },
        Value::List(items) => literal.as_array().is_some_and(|arr| {
            arr.len() == items.len()
                && arr.iter().zip(items).all(|(l, v)| literal_matches(l, v))
        }),
        Value::TextMap(map) => literal.as_object().is_some_and(|obj| {
            obj.len() == map.len()
                && obj
                    .iter()
                    .all(|(k, l)| map.get(k).is_some_and(|v| literal_matches(l, v)))
        }),
        Value::GenMap(map) => literal.as_array().is_some_and(|arr| {
            arr.len() == map.len()
                && arr.iter().zip(map.iter()).all(|(pair, (k, v))| {
                    matches!(pair.as_array(), Some(kv) if kv.len() == 2
                        && literal_matches(&kv[0], k)
                        && literal_matches(&kv[1], v))
                })
        }),
        Value::Record(record) => literal.as_object().is_some_and(|obj| {
            obj.iter().all(|(name, l)| {
                record
                    .get(name)
                    .is_some_and(|v| constraint_matches(l, v))
            })
        }),
        Value::Variant { constructor, value } => literal.as_object().is_some_and(|obj| {
            obj.get("tag").and_then(Json::as_str) == Some(constructor.as_str())
                && obj.get("value").is_some_and(|l| literal_matches(l, value))
        }),
    }
}

/// Inside an optional, `[]` is `None` and `[x]` is `Some(x)`.
fn nested_optional_matches(literal: &Json, value: Option<&Value>) -> bool {
    match (literal.as_array().map(Vec::as_slice), value) {
        (Some([]), None) => true,
        (Some([item]), Some(Value::Optional(deeper))) => {
            nested_optional_matches(item, deeper.as_deref())
        }
        (Some([item]), Some(value)) => constraint_matches(item, value),
        _ => false,
    }
}

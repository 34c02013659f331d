//! Native representation of ledger values.

use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of significant digits a ledger numeric can carry.
pub const NUMERIC_PRECISION: usize = 38;

/// Largest supported numeric scale.
pub const MAX_NUMERIC_SCALE: u8 = 37;

/// Numeric parse/validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("not a decimal literal: {0:?}")]
    Syntax(String),

    #[error("{value} has more than {scale} fractional digits")]
    Scale { value: String, scale: u8 },

    #[error("scale {0} is outside 0..={max}", max = MAX_NUMERIC_SCALE)]
    UnsupportedScale(u8),

    #[error("{value} does not fit in {precision} digits at scale {scale}")]
    Precision {
        value: String,
        precision: usize,
        scale: u8,
    },
}

/// An exact decimal kept in its textual wire form.
///
/// Equality and ordering compare the decimal value, so `"3"`, `"3.0"` and
/// `"3.000"` are equal, while the original text is what gets encoded back.
/// Values within `rust_decimal`'s 28 digits compare as `Decimal`; wider ones
/// fall back to a digit-wise comparison of the text.
#[derive(Debug, Clone)]
pub struct Numeric {
    repr: String,
}

impl Numeric {
    /// Parse a decimal literal (`-?digits(.digits)?`) without a scale check.
    pub fn parse(text: &str) -> Result<Self, NumericError> {
        let digits = text.strip_prefix('-').unwrap_or(text);
        let (int, frac) = match digits.split_once('.') {
            Some((int, frac)) => (int, Some(frac)),
            None => (digits, None),
        };
        let valid = !int.is_empty()
            && int.bytes().all(|b| b.is_ascii_digit())
            && frac.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()));
        if !valid {
            return Err(NumericError::Syntax(text.to_string()));
        }
        Ok(Self {
            repr: text.to_string(),
        })
    }

    /// Parse and check that the value is representable at `scale`.
    pub fn with_scale(text: &str, scale: u8) -> Result<Self, NumericError> {
        let numeric = Self::parse(text)?;
        numeric.check_scale(scale)?;
        Ok(numeric)
    }

    /// Check that the value has at most `scale` significant fractional digits
    /// and at most `38 - scale` integer digits.
    pub fn check_scale(&self, scale: u8) -> Result<(), NumericError> {
        if scale > MAX_NUMERIC_SCALE {
            return Err(NumericError::UnsupportedScale(scale));
        }
        let (_, int, frac) = self.parts();
        if frac.len() > scale as usize {
            return Err(NumericError::Scale {
                value: self.repr.clone(),
                scale,
            });
        }
        if int.len() > NUMERIC_PRECISION - scale as usize {
            return Err(NumericError::Precision {
                value: self.repr.clone(),
                precision: NUMERIC_PRECISION,
                scale,
            });
        }
        Ok(())
    }

    /// The text this numeric was built from.
    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// Convert to a `rust_decimal::Decimal` when the value fits its 28 digits.
    pub fn to_decimal(&self) -> Option<rust_decimal::Decimal> {
        rust_decimal::Decimal::from_str_exact(&self.repr).ok()
    }

    /// Sign, integer digits without leading zeros, fraction digits without
    /// trailing zeros. Zero is never negative.
    fn parts(&self) -> (bool, &str, &str) {
        let negative = self.repr.starts_with('-');
        let digits = self.repr.strip_prefix('-').unwrap_or(&self.repr);
        let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
        let int = int.trim_start_matches('0');
        let frac = frac.trim_end_matches('0');
        let negative = negative && !(int.is_empty() && frac.is_empty());
        (negative, int, frac)
    }
}

fn cmp_magnitude(a: (&str, &str), b: (&str, &str)) -> Ordering {
    a.0.len()
        .cmp(&b.0.len())
        .then_with(|| a.0.cmp(b.0))
        .then_with(|| a.1.cmp(b.1))
}

impl Numeric {
    fn cmp_digits(&self, other: &Self) -> Ordering {
        let (neg_a, int_a, frac_a) = self.parts();
        let (neg_b, int_b, frac_b) = other.parts();
        match (neg_a, neg_b) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => cmp_magnitude((int_a, frac_a), (int_b, frac_b)),
            (true, true) => cmp_magnitude((int_b, frac_b), (int_a, frac_a)),
        }
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Numeric {}

impl Ord for Numeric {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.to_decimal(), other.to_decimal()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.cmp_digits(other),
        }
    }
}

impl PartialOrd for Numeric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Numeric {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl From<rust_decimal::Decimal> for Numeric {
    fn from(value: rust_decimal::Decimal) -> Self {
        Self {
            repr: value.to_string(),
        }
    }
}

/// Record fields in declaration order.
///
/// Equality ignores field order: two records are equal when they carry the
/// same field names with equal values.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a field, replacing an existing one of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl Eq for Record {}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

/// A map whose keys may be any ledger value.
///
/// Entries keep insertion order. Keys are compared structurally, so two
/// separately built but equal keys address the same entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenMap {
    entries: Vec<(Value, Value)>,
}

impl GenMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: Value, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace; a replaced entry keeps its position.
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A ledger value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int64(i64),
    Numeric(Numeric),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Party(String),
    ContractId(String),
    Optional(Option<Box<Value>>),
    List(Vec<Value>),
    TextMap(BTreeMap<String, Value>),
    GenMap(GenMap),
    Record(Record),
    Variant { constructor: String, value: Box<Value> },
    Enum(String),
}

impl Value {
    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    pub fn party(party: impl Into<String>) -> Self {
        Value::Party(party.into())
    }

    pub fn contract_id(id: impl Into<String>) -> Self {
        Value::ContractId(id.into())
    }

    pub fn some(value: Value) -> Self {
        Value::Optional(Some(Box::new(value)))
    }

    pub fn none() -> Self {
        Value::Optional(None)
    }

    pub fn variant(constructor: impl Into<String>, value: Value) -> Self {
        Value::Variant {
            constructor: constructor.into(),
            value: Box::new(value),
        }
    }

    pub fn enumeration(constructor: impl Into<String>) -> Self {
        Value::Enum(constructor.into())
    }

    /// Build a record value from `(name, value)` pairs.
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Record(fields.into_iter().collect())
    }

    /// A two-field tuple record (`_1`, `_2`), the shape of composite keys.
    pub fn tuple2(first: Value, second: Value) -> Self {
        Value::Record(Record::new().with("_1", first).with("_2", second))
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Look up a field when this value is a record.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_record().and_then(|r| r.get(name))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Party(s) | Value::ContractId(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Short name of the value's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::Numeric(_) => "numeric",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::Party(_) => "party",
            Value::ContractId(_) => "contract id",
            Value::Optional(_) => "optional",
            Value::List(_) => "list",
            Value::TextMap(_) => "text map",
            Value::GenMap(_) => "generic map",
            Value::Record(_) => "record",
            Value::Variant { .. } => "variant",
            Value::Enum(_) => "enum",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<Numeric> for Value {
    fn from(value: Numeric) -> Self {
        Value::Numeric(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

impl From<GenMap> for Value {
    fn from(value: GenMap) -> Self {
        Value::GenMap(value)
    }
}

//! Codec error types.

use std::fmt;
use thiserror::Error;

/// One step of the path from the root of a wire value to a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, ".{}", name),
            PathSegment::Index(i) => write!(f, "[{}]", i),
            PathSegment::Key(key) => write!(f, "[{:?}]", key),
        }
    }
}

fn render_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "$".to_string();
    }
    let mut out = String::from("$");
    for segment in path {
        out.push_str(&segment.to_string());
    }
    out
}

/// A wire value did not match the expected shape.
///
/// Decode failures are plain values: nothing is left half-built and the
/// caller decides what to do with them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("decode failed at {}: {message}", render_path(.path))]
pub struct DecodeError {
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// Prefix the error path with the segment the caller was decoding.
    pub fn at(mut self, segment: PathSegment) -> Self {
        self.path.insert(0, segment);
        self
    }

    pub fn at_field(self, name: &str) -> Self {
        self.at(PathSegment::Field(name.to_string()))
    }

    pub fn at_index(self, index: usize) -> Self {
        self.at(PathSegment::Index(index))
    }
}

/// A typed value did not fit the codec it was encoded with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("encode failed at {}: {message}", render_path(.path))]
pub struct EncodeError {
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl EncodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    pub fn at(mut self, segment: PathSegment) -> Self {
        self.path.insert(0, segment);
        self
    }
}

/// Schema construction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("type {0} is defined twice")]
    DuplicateType(String),

    #[error("type {referenced} referenced from {from} is not defined")]
    UndefinedType { from: String, referenced: String },

    #[error("numeric scale {0} is out of range (0..=37)")]
    InvalidScale(u8),

    #[error("invalid template id: {0}")]
    InvalidTemplateId(String),
}

/// Result alias for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result alias for encoding.
pub type EncodeResult<T> = Result<T, EncodeError>;

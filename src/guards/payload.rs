//! Structured Payload Validation
//!
//! Request bodies are decoded into [`StructuredValue`], a closed set of data
//! variants with no way to carry code or arbitrary object graphs, and then
//! gated on their top-level shape.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::ValidationError;

/// A decoded request body
///
/// Objects are keyed by a sorted map, so an echoed object lists its keys in
/// sorted order rather than the order they arrived in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StructuredValue {
    Object(BTreeMap<String, StructuredValue>),
    Array(Vec<StructuredValue>),
    String(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
}

impl StructuredValue {
    /// Name of the variant, for error reporting
    pub fn shape(&self) -> &'static str {
        match self {
            StructuredValue::Object(_) => "object",
            StructuredValue::Array(_) => "array",
            StructuredValue::String(_) => "string",
            StructuredValue::Number(_) => "number",
            StructuredValue::Bool(_) => "boolean",
            StructuredValue::Null => "null",
        }
    }
}

impl From<Value> for StructuredValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => StructuredValue::Null,
            Value::Bool(b) => StructuredValue::Bool(b),
            Value::Number(n) => StructuredValue::Number(n),
            Value::String(s) => StructuredValue::String(s),
            Value::Array(items) => {
                StructuredValue::Array(items.into_iter().map(StructuredValue::from).collect())
            }
            Value::Object(map) => StructuredValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, StructuredValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Decodes and shape-gates request payloads
pub struct PayloadTypeValidator;

impl PayloadTypeValidator {
    /// Strictly decode JSON bytes
    ///
    /// Anything serde_json refuses (syntax errors, trailing data, invalid
    /// UTF-8, nesting past its recursion limit) is `MalformedPayload`.
    pub fn decode(bytes: &[u8]) -> Result<StructuredValue, ValidationError> {
        serde_json::from_slice::<Value>(bytes)
            .map(StructuredValue::from)
            .map_err(|_| ValidationError::MalformedPayload)
    }

    /// Accept only object or array top-level shapes
    pub fn validate(value: StructuredValue) -> Result<StructuredValue, ValidationError> {
        match value {
            StructuredValue::Object(_) | StructuredValue::Array(_) => Ok(value),
            other => Err(ValidationError::UnexpectedShape {
                found: other.shape(),
            }),
        }
    }

    /// Decode then validate
    pub fn decode_and_validate(bytes: &[u8]) -> Result<StructuredValue, ValidationError> {
        Self::validate(Self::decode(bytes)?)
    }
}

//! Payload value tree
//!
//! Payloads are owned trees, so they cannot contain cycles. Floats are kept
//! as raw `f64` and checked for finiteness only when encoded.

use std::collections::BTreeMap;

use crate::error::{ControlError, Result};

/// String-keyed payload mapping, ordered by key
pub type Payload = BTreeMap<String, Value>;

/// A value carried inside a message payload
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Payload),
}

impl Value {
    /// Numeric view of the value; integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Payload> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Name of the variant, used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Convert into a JSON value; `path` locates the value in error messages
    pub(crate) fn to_json(&self, path: &str) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    ControlError::encoding(format!("non-finite number {} at {}", f, path))
                })?,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item.to_json(&format!("{}[{}]", path, i)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Map(map) => serde_json::Value::Object(payload_to_json(map, path)?),
        })
    }
}

pub(crate) fn payload_to_json(
    payload: &Payload,
    path: &str,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    payload
        .iter()
        .map(|(key, value)| -> Result<(String, serde_json::Value)> {
            Ok((key.clone(), value.to_json(&format!("{}.{}", path, key))?))
        })
        .collect()
}

pub(crate) fn payload_from_json(map: serde_json::Map<String, serde_json::Value>) -> Payload {
    map.into_iter()
        .map(|(key, value)| (key, Value::from(value)))
        .collect()
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                // u64 beyond i64::MAX and every fractional number
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(payload_from_json(map)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Payload> for Value {
    fn from(map: Payload) -> Self {
        Value::Map(map)
    }
}

//! Message codec for feedback and metrics reports
//!
//! Messages travel as JSON objects:
//! - `module_id` (string, required)
//! - `payload` (object, required)
//! - `timestamp` (ISO-8601 string, optional)
//!
//! Encoding is canonical: object keys are emitted in sorted order.

mod value;

pub use value::{Payload, Value};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::error::{ControlError, Result};

/// Naive ISO-8601 layouts accepted besides RFC 3339
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];

/// Wire-level envelope exchanged with modules
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub module_id: String,
    pub payload: Payload,
    pub timestamp: Option<String>,
}

impl Message {
    pub fn new(module_id: impl Into<String>, payload: Payload) -> Self {
        Self {
            module_id: module_id.into(),
            payload,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Parsed form of the timestamp, if present and well-formed
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}

/// Serialize a message to canonical JSON text
///
/// An envelope that [`decode`] would refuse is a validation error here too.
pub fn encode(message: &Message) -> Result<String> {
    validate_envelope(&message.module_id, message.timestamp.as_deref())?;

    let mut envelope = serde_json::Map::new();
    envelope.insert(
        "module_id".to_string(),
        serde_json::Value::String(message.module_id.clone()),
    );
    envelope.insert(
        "payload".to_string(),
        serde_json::Value::Object(value::payload_to_json(&message.payload, "payload")?),
    );
    if let Some(ref timestamp) = message.timestamp {
        envelope.insert(
            "timestamp".to_string(),
            serde_json::Value::String(timestamp.clone()),
        );
    }

    serde_json::to_string(&serde_json::Value::Object(envelope))
        .map_err(|e| ControlError::encoding(e.to_string()))
}

/// Parse JSON text into a validated message
///
/// Malformed syntax is a decoding error; a syntactically valid document
/// without the required fields is a validation error.
pub fn decode(text: &str) -> Result<Message> {
    let document: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        debug!(error = %e, "Failed to parse message");
        ControlError::Decoding(e)
    })?;

    let mut envelope = match document {
        serde_json::Value::Object(map) => map,
        other => {
            return Err(ControlError::validation(format!(
                "message must be a JSON object, got {}",
                json_type_name(&other)
            )))
        }
    };

    let module_id = match envelope.remove("module_id") {
        Some(serde_json::Value::String(id)) => id,
        Some(other) => {
            return Err(ControlError::validation(format!(
                "module_id must be a string, got {}",
                json_type_name(&other)
            )))
        }
        None => return Err(ControlError::validation("missing required field 'module_id'")),
    };

    let payload = match envelope.remove("payload") {
        Some(serde_json::Value::Object(map)) => value::payload_from_json(map),
        Some(other) => {
            return Err(ControlError::validation(format!(
                "payload must be an object, got {}",
                json_type_name(&other)
            )))
        }
        None => return Err(ControlError::validation("missing required field 'payload'")),
    };

    let timestamp = match envelope.remove("timestamp") {
        None => None,
        Some(serde_json::Value::String(ts)) => Some(ts),
        Some(other) => {
            return Err(ControlError::validation(format!(
                "timestamp must be a string, got {}",
                json_type_name(&other)
            )))
        }
    };

    validate_envelope(&module_id, timestamp.as_deref())?;

    Ok(Message {
        module_id,
        payload,
        timestamp,
    })
}

/// Envelope rules shared by both directions of the codec
fn validate_envelope(module_id: &str, timestamp: Option<&str>) -> Result<()> {
    if module_id.is_empty() {
        return Err(ControlError::validation("module_id must not be empty"));
    }
    if let Some(ts) = timestamp {
        if parse_timestamp(ts).is_none() {
            return Err(ControlError::validation(format!(
                "timestamp '{}' is not ISO-8601",
                ts
            )));
        }
    }
    Ok(())
}

/// Format a time the way the controller stamps outgoing messages
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 or naive ISO-8601 timestamp; naive times are taken as UTC
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

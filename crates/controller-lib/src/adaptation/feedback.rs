//! Parsing of externally supplied feedback

use std::collections::BTreeMap;

use crate::codec::{Payload, Value};
use crate::error::{ControlError, Result};
use crate::models::{Feedback, FeedbackStatus};

impl Feedback {
    /// Build feedback from a wire payload
    ///
    /// Requires string `target_module` and `status`; `details`, when
    /// present, must map strings to strings.
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        let target_module = required_str(payload, "target_module")?;
        let status: FeedbackStatus = required_str(payload, "status")?.parse()?;

        let details = match payload.get("details") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Map(map)) => map
                .iter()
                .map(|(key, value)| {
                    value
                        .as_str()
                        .map(|v| (key.clone(), v.to_string()))
                        .ok_or_else(|| {
                            ControlError::validation(format!(
                                "feedback detail '{}' must be a string, got {}",
                                key,
                                value.type_name()
                            ))
                        })
                })
                .collect::<Result<BTreeMap<String, String>>>()?,
            Some(other) => {
                return Err(ControlError::validation(format!(
                    "feedback details must be a map, got {}",
                    other.type_name()
                )))
            }
        };

        Ok(Feedback {
            target_module: target_module.to_string(),
            status,
            details,
        })
    }
}

fn required_str<'a>(payload: &'a Payload, key: &str) -> Result<&'a str> {
    match payload.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => Err(ControlError::validation(format!(
            "feedback field '{}' must not be empty",
            key
        ))),
        Some(other) => Err(ControlError::validation(format!(
            "feedback field '{}' must be a string, got {}",
            key,
            other.type_name()
        ))),
        None => Err(ControlError::validation(format!(
            "missing required feedback field '{}'",
            key
        ))),
    }
}

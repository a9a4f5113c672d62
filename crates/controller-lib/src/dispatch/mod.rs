//! Feedback dispatch
//!
//! Builds the feedback message for a decision, encodes it, and hands the
//! encoded text to a transport. Nothing is sent if encoding fails.

mod transport;

pub use transport::{ChannelTransport, Outbound, RecordingTransport, Transport, TransportError};

use chrono::Utc;
use tracing::{debug, warn};

use crate::codec::{self, Message, Payload, Value};
use crate::error::{ControlError, Result};
use crate::models::{AdaptationDecision, Strategy};

/// Configuration for the feedback dispatcher
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    /// Skip sending `no_action` feedback
    pub suppress_no_action: bool,
}

/// Result of a successful dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// The message was encoded and handed to the transport
    Sent { message: Message, encoded: String },
    /// A `no_action` decision was suppressed by configuration
    Suppressed,
}

impl Dispatched {
    pub fn message(&self) -> Option<&Message> {
        match self {
            Dispatched::Sent { message, .. } => Some(message),
            Dispatched::Suppressed => None,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Dispatched::Sent { .. })
    }
}

/// Sends adaptation decisions back to their modules
pub struct FeedbackDispatcher<T> {
    transport: T,
    config: DispatchConfig,
}

impl<T: Transport> FeedbackDispatcher<T> {
    pub fn new(transport: T, config: DispatchConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build, encode, and send the feedback message for a decision
    pub fn dispatch(&self, decision: &AdaptationDecision) -> Result<Dispatched> {
        if decision.strategy == Strategy::NoAction && self.config.suppress_no_action {
            debug!(module_id = %decision.target_module, "Suppressed no_action feedback");
            return Ok(Dispatched::Suppressed);
        }

        let message = feedback_message(decision);
        let encoded = self.send_message(&message)?;

        debug!(
            module_id = %message.module_id,
            strategy = %decision.strategy,
            "Feedback handed to transport"
        );
        Ok(Dispatched::Sent { message, encoded })
    }

    /// Encode any message and send it to its module
    ///
    /// Returns the encoded text. The transport is not called when encoding fails.
    pub fn send_message(&self, message: &Message) -> Result<String> {
        let encoded = codec::encode(message)?;

        self.transport
            .send(&message.module_id, &encoded)
            .map_err(|e| {
                warn!(module_id = %message.module_id, error = %e, "Transport rejected feedback");
                ControlError::Transport {
                    module_id: message.module_id.clone(),
                    reason: e.to_string(),
                }
            })?;

        Ok(encoded)
    }
}

/// Feedback message for a decision, stamped with the current time
pub fn feedback_message(decision: &AdaptationDecision) -> Message {
    let mut payload = Payload::new();
    payload.insert(
        "strategy".to_string(),
        Value::from(decision.strategy.as_str()),
    );
    payload.insert(
        "target_module".to_string(),
        Value::from(decision.target_module.as_str()),
    );
    payload.insert(
        "decided_at".to_string(),
        Value::from(codec::iso_timestamp(decision.decided_at)),
    );

    Message::new(decision.target_module.clone(), payload)
        .with_timestamp(codec::iso_timestamp(Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(strategy: Strategy) -> AdaptationDecision {
        AdaptationDecision {
            strategy,
            target_module: "m1".to_string(),
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn test_dispatch_sends_decodable_message() {
        let dispatcher = FeedbackDispatcher::new(RecordingTransport::new(), DispatchConfig::default());
        let result = dispatcher.dispatch(&decision(Strategy::Replace)).unwrap();

        let sent = dispatcher.transport().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "m1");

        let decoded = codec::decode(&sent[0].1).unwrap();
        assert_eq!(Some(&decoded), result.message());
        assert_eq!(decoded.module_id, "m1");
        assert_eq!(decoded.payload["strategy"].as_str(), Some("replace"));
        assert_eq!(decoded.payload["target_module"].as_str(), Some("m1"));
        assert!(codec::parse_timestamp(decoded.payload["decided_at"].as_str().unwrap()).is_some());
        assert!(decoded.timestamp_utc().is_some());
    }

    #[test]
    fn test_no_action_sent_by_default() {
        let dispatcher = FeedbackDispatcher::new(RecordingTransport::new(), DispatchConfig::default());
        let result = dispatcher.dispatch(&decision(Strategy::NoAction)).unwrap();

        assert!(result.is_sent());
        assert_eq!(dispatcher.transport().sent().len(), 1);
    }

    #[test]
    fn test_no_action_suppressed_when_configured() {
        let dispatcher = FeedbackDispatcher::new(
            RecordingTransport::new(),
            DispatchConfig {
                suppress_no_action: true,
            },
        );

        assert_eq!(
            dispatcher.dispatch(&decision(Strategy::NoAction)).unwrap(),
            Dispatched::Suppressed
        );
        assert!(dispatcher.transport().sent().is_empty());

        // Actionable decisions are unaffected
        assert!(dispatcher.dispatch(&decision(Strategy::Optimize)).unwrap().is_sent());
    }

    #[test]
    fn test_unencodable_message_is_not_sent() {
        let dispatcher = FeedbackDispatcher::new(RecordingTransport::new(), DispatchConfig::default());
        let mut payload = Payload::new();
        payload.insert("score".to_string(), Value::Float(f64::NAN));

        let err = dispatcher
            .send_message(&Message::new("m1", payload))
            .unwrap_err();
        assert!(err.is_encoding());
        assert!(dispatcher.transport().sent().is_empty());
    }

    #[test]
    fn test_transport_failure_is_reported() {
        let failing = |_: &str, _: &str| -> std::result::Result<(), TransportError> {
            Err(TransportError::new("link down"))
        };
        let dispatcher = FeedbackDispatcher::new(failing, DispatchConfig::default());

        let err = dispatcher.dispatch(&decision(Strategy::Reconfigure)).unwrap_err();
        assert!(matches!(err, ControlError::Transport { ref module_id, .. } if module_id == "m1"));
        assert!(err.to_string().contains("link down"));
    }
}

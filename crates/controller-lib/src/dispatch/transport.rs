//! Transport seam for encoded feedback
//!
//! The controller does not own a network layer. Whatever delivers feedback
//! to modules implements [`Transport`]; plain closures qualify.

use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure reported by a transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Delivers an encoded message to a module
pub trait Transport: Send + Sync {
    fn send(&self, module_id: &str, encoded: &str) -> Result<(), TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&str, &str) -> Result<(), TransportError> + Send + Sync,
{
    fn send(&self, module_id: &str, encoded: &str) -> Result<(), TransportError> {
        self(module_id, encoded)
    }
}

/// Encoded feedback addressed to a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub module_id: String,
    pub encoded: String,
}

/// Forwards feedback into a bounded channel without blocking the loop
///
/// A full or closed channel is reported as a transport error.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Outbound>,
}

impl ChannelTransport {
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, module_id: &str, encoded: &str) -> Result<(), TransportError> {
        self.tx
            .try_send(Outbound {
                module_id: module_id.to_string(),
                encoded: encoded.to_string(),
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::new("outbound channel full"),
                mpsc::error::TrySendError::Closed(_) => {
                    TransportError::new("outbound channel closed")
                }
            })
    }
}

/// Keeps every message it is given, in order
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(module_id, encoded)` pairs sent so far
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, module_id: &str, encoded: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((module_id.to_string(), encoded.to_string()));
        Ok(())
    }
}

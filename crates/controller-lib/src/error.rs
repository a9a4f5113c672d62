//! Error taxonomy for the control loop
//!
//! Every fallible operation in this crate returns [`ControlError`]. All
//! variants are recoverable: the failing call leaves prior state unchanged
//! and the caller decides whether to skip, log, or retry on the next cycle.

use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors raised by the metrics store, codec, selector, and dispatcher
#[derive(Debug, Error)]
pub enum ControlError {
    /// Input is well-formed but violates a domain constraint
    #[error("validation failed: {0}")]
    Validation(String),

    /// Wire text is not syntactically valid
    #[error("malformed message: {0}")]
    Decoding(#[source] serde_json::Error),

    /// A value cannot be represented in the wire format
    #[error("message not serializable: {0}")]
    Encoding(String),

    /// The transport collaborator refused the encoded message
    #[error("transport failed for module '{module_id}': {reason}")]
    Transport { module_id: String, reason: String },
}

/// Coarse error kind, for metrics labels and caller-side matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Decoding,
    Encoding,
    Transport,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Decoding => "decoding",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Transport => "transport",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ControlError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        ControlError::Validation(reason.into())
    }

    pub(crate) fn encoding(reason: impl Into<String>) -> Self {
        ControlError::Encoding(reason.into())
    }

    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::Validation(_) => ErrorKind::Validation,
            ControlError::Decoding(_) => ErrorKind::Decoding,
            ControlError::Encoding(_) => ErrorKind::Encoding,
            ControlError::Transport { .. } => ErrorKind::Transport,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_decoding(&self) -> bool {
        self.kind() == ErrorKind::Decoding
    }

    pub fn is_encoding(&self) -> bool {
        self.kind() == ErrorKind::Encoding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ControlError::validation("missing latency").kind(),
            ErrorKind::Validation
        );
        assert_eq!(ControlError::encoding("NaN").kind(), ErrorKind::Encoding);

        let syntax = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(ControlError::Decoding(syntax).is_decoding());
    }

    #[test]
    fn test_display_includes_reason() {
        let err = ControlError::Transport {
            module_id: "m1".to_string(),
            reason: "queue full".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("m1"));
        assert!(text.contains("queue full"));
        assert_eq!(err.kind().to_string(), "transport");
    }
}

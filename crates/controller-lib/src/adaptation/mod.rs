//! Adaptation strategy selection
//!
//! Turns feedback signals into adaptation decisions:
//! - critical signals pick `replace` or `optimize` from an injectable random source
//! - warning signals always `reconfigure`
//! - informational signals need `no_action`

mod feedback;
mod selector;

pub use selector::{AdaptationSelector, ApplyOutcome, CRITICAL_STRATEGIES};

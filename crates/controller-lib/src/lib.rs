//! Closed-loop performance monitor and adaptation controller
//!
//! This crate provides the core functionality for:
//! - Collecting per-module performance samples into a bounded store
//! - Classifying modules against accuracy and throughput thresholds
//! - Selecting an adaptation strategy per module
//! - Encoding feedback and dispatching it through a transport
//! - Health checks and observability

pub mod adaptation;
pub mod analyzer;
pub mod codec;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod store;

pub use adaptation::{AdaptationSelector, ApplyOutcome};
pub use analyzer::{Analysis, AnalyzerConfig, PerformanceAnalyzer};
pub use codec::{decode, encode, Message, Payload, Value};
pub use control::{ControlConfig, ControlLoop, ControlLoopBuilder, CycleReport};
pub use dispatch::{DispatchConfig, Dispatched, FeedbackDispatcher, Transport, TransportError};
pub use error::{ControlError, ErrorKind, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ControllerMetrics, StructuredLogger};
pub use store::{MetricsStore, Snapshot, StoreConfig};

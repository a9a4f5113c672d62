//! Observability infrastructure for the controller
//!
//! Provides:
//! - Prometheus metrics (cycle latency, sample intake, classifications, decisions, dispatch)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::models::{AdaptationDecision, ModuleState, Strategy};

/// Histogram buckets for cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();

struct ControllerMetricsInner {
    cycle_latency_seconds: Histogram,
    samples_collected: IntCounter,
    samples_rejected: IntCounterVec,
    store_entries: IntGauge,
    modules_by_state: IntGaugeVec,
    decisions: IntCounterVec,
    messages_dispatched: IntCounter,
    dispatch_errors: IntCounterVec,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "adaptive_controller_cycle_latency_seconds",
                "Time spent running one analyze/select/dispatch cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            samples_collected: register_int_counter!(
                "adaptive_controller_samples_collected_total",
                "Metrics samples accepted into the store"
            )
            .expect("Failed to register samples_collected"),

            samples_rejected: register_int_counter_vec!(
                "adaptive_controller_samples_rejected_total",
                "Metrics reports rejected before reaching the store",
                &["kind"]
            )
            .expect("Failed to register samples_rejected"),

            store_entries: register_int_gauge!(
                "adaptive_controller_store_entries",
                "Samples currently held in the metrics window"
            )
            .expect("Failed to register store_entries"),

            modules_by_state: register_int_gauge_vec!(
                "adaptive_controller_modules",
                "Modules per classification in the latest cycle",
                &["state"]
            )
            .expect("Failed to register modules_by_state"),

            decisions: register_int_counter_vec!(
                "adaptive_controller_decisions_total",
                "Adaptation decisions by strategy",
                &["strategy"]
            )
            .expect("Failed to register decisions"),

            messages_dispatched: register_int_counter!(
                "adaptive_controller_messages_dispatched_total",
                "Feedback messages handed to the transport"
            )
            .expect("Failed to register messages_dispatched"),

            dispatch_errors: register_int_counter_vec!(
                "adaptive_controller_dispatch_errors_total",
                "Feedback messages that failed to encode or send",
                &["kind"]
            )
            .expect("Failed to register dispatch_errors"),
        }
    }
}

/// Controller metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn inc_samples_collected(&self) {
        self.inner().samples_collected.inc();
    }

    /// Count a rejected report under its error kind
    pub fn inc_samples_rejected(&self, kind: &str) {
        self.inner().samples_rejected.with_label_values(&[kind]).inc();
    }

    pub fn set_store_entries(&self, entries: usize) {
        self.inner().store_entries.set(entries as i64);
    }

    /// Publish the per-state module counts of the latest analysis
    pub fn set_modules_by_state(&self, counts: &[(ModuleState, usize)]) {
        for state in ModuleState::ALL {
            let count = counts
                .iter()
                .find(|(s, _)| *s == state)
                .map(|(_, c)| *c)
                .unwrap_or(0);
            self.inner()
                .modules_by_state
                .with_label_values(&[state.as_str()])
                .set(count as i64);
        }
    }

    pub fn inc_decision(&self, strategy: Strategy) {
        self.inner()
            .decisions
            .with_label_values(&[strategy.as_str()])
            .inc();
    }

    pub fn inc_messages_dispatched(&self) {
        self.inner().messages_dispatched.inc();
    }

    pub fn inc_dispatch_errors(&self, kind: &str) {
        self.inner().dispatch_errors.with_label_values(&[kind]).inc();
    }
}

/// Structured logger for controller events
///
/// Emits consistently named events so log pipelines can key on `event`.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log controller startup
    pub fn log_startup(&self, version: &str, store_capacity: usize) {
        info!(
            event = "controller_started",
            node = %self.node_name,
            controller_version = %version,
            store_capacity = store_capacity,
            "Adaptive controller started"
        );
    }

    /// Log controller shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Adaptive controller shutting down"
        );
    }

    /// Log a strategy decision for a module
    pub fn log_decision(&self, decision: &AdaptationDecision, state: Option<ModuleState>) {
        let state = state.map(|s| s.as_str()).unwrap_or("external");
        if decision.strategy.is_actionable() {
            info!(
                event = "adaptation_decided",
                node = %self.node_name,
                module_id = %decision.target_module,
                state = %state,
                strategy = %decision.strategy,
                "Adaptation decided"
            );
        } else {
            debug!(
                event = "adaptation_decided",
                node = %self.node_name,
                module_id = %decision.target_module,
                state = %state,
                strategy = %decision.strategy,
                "No adaptation needed"
            );
        }
    }

    /// Log a feedback message handed to the transport
    pub fn log_dispatch(&self, module_id: &str, strategy: Strategy, bytes: usize) {
        debug!(
            event = "feedback_dispatched",
            node = %self.node_name,
            module_id = %module_id,
            strategy = %strategy,
            bytes = bytes,
            "Feedback dispatched"
        );
    }

    /// Log input that was rejected and skipped
    pub fn log_rejection(&self, source: &str, kind: &str, reason: &str) {
        warn!(
            event = "input_rejected",
            node = %self.node_name,
            source = %source,
            kind = %kind,
            reason = %reason,
            "Input rejected"
        );
    }
}

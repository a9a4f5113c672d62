//! Control loop
//!
//! Runs the analyze → select → apply → dispatch cycle on a fixed interval.
//! Producers keep collecting into the shared store while the loop runs.
//! Shutdown is only observed between cycles, so a cycle that has started
//! always finishes its dispatches.

use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adaptation::{AdaptationSelector, ApplyOutcome};
use crate::analyzer::{AnalyzerConfig, PerformanceAnalyzer};
use crate::dispatch::{DispatchConfig, Dispatched, FeedbackDispatcher, Transport};
use crate::error::{ControlError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{Feedback, ModuleState, Strategy};
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::store::MetricsStore;

/// Configuration for the control loop
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Time between cycles (default: 10 seconds)
    pub interval: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Outcome of one cycle
#[derive(Debug, Default, Clone)]
pub struct CycleReport {
    /// Modules classified in this cycle
    pub modules: usize,
    pub decisions: HashMap<Strategy, usize>,
    /// Decisions whose adaptation was carried out
    pub applied: usize,
    pub dispatched: usize,
    pub suppressed: usize,
    /// Modules whose selection or dispatch failed
    pub failures: usize,
    /// Reports the store rejected since the previous cycle
    pub rejected: u64,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn decisions_for(&self, strategy: Strategy) -> usize {
        self.decisions.get(&strategy).copied().unwrap_or(0)
    }
}

/// The closed control loop over a shared metrics store
pub struct ControlLoop<T, R = StdRng> {
    store: Arc<MetricsStore>,
    analyzer: PerformanceAnalyzer,
    selector: AdaptationSelector<R>,
    dispatcher: FeedbackDispatcher<T>,
    config: ControlConfig,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    cycles: u64,
    /// Store rejection count seen at the end of the previous cycle
    rejected_seen: u64,
}

impl<T: Transport, R: Rng> ControlLoop<T, R> {
    pub fn new(
        store: Arc<MetricsStore>,
        analyzer: PerformanceAnalyzer,
        selector: AdaptationSelector<R>,
        dispatcher: FeedbackDispatcher<T>,
        config: ControlConfig,
    ) -> Self {
        let rejected_seen = store.stats().rejected;
        Self {
            store,
            analyzer,
            selector,
            dispatcher,
            config,
            metrics: ControllerMetrics::new(),
            logger: StructuredLogger::new("local"),
            health: None,
            cycles: 0,
            rejected_seen,
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn store(&self) -> &Arc<MetricsStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &FeedbackDispatcher<T> {
        &self.dispatcher
    }

    pub fn selector(&self) -> &AdaptationSelector<R> {
        &self.selector
    }

    /// Cycles completed so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one full cycle over the current contents of the store
    ///
    /// A failure for one module is counted and logged; the remaining
    /// modules are still processed.
    pub fn run_cycle(&mut self) -> CycleReport {
        let start = Instant::now();
        let analysis = self.analyzer.analyze(&self.store);
        self.metrics.set_modules_by_state(&analysis.state_counts());

        let mut report = CycleReport {
            modules: analysis.len(),
            ..Default::default()
        };

        for feedback in analysis.feedback() {
            let state = analysis.state(&feedback.target_module);
            match self.process(&feedback, state) {
                Ok((strategy, outcome, dispatched)) => {
                    *report.decisions.entry(strategy).or_insert(0) += 1;
                    if outcome == ApplyOutcome::Applied {
                        report.applied += 1;
                    }
                    if dispatched.is_sent() {
                        report.dispatched += 1;
                    } else {
                        report.suppressed += 1;
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        module_id = %feedback.target_module,
                        kind = %e.kind(),
                        error = %e,
                        "Failed to adapt module"
                    );
                }
            }
        }

        // Applied history only covers modules still in the window
        self.selector.retain(|module_id| analysis.state(module_id).is_some());

        let rejected = self.store.stats().rejected;
        report.rejected = rejected.saturating_sub(self.rejected_seen);
        self.rejected_seen = rejected;

        report.elapsed = start.elapsed();
        self.metrics.observe_cycle_latency(report.elapsed.as_secs_f64());
        self.cycles += 1;
        report
    }

    /// Act on a feedback signal supplied from outside the analyzer
    pub fn submit_feedback(&mut self, feedback: &Feedback) -> Result<Dispatched> {
        self.process(feedback, None)
            .map(|(_, _, dispatched)| dispatched)
    }

    fn process(
        &mut self,
        feedback: &Feedback,
        state: Option<ModuleState>,
    ) -> Result<(Strategy, ApplyOutcome, Dispatched)> {
        let decision = self.selector.select(feedback)?;
        self.metrics.inc_decision(decision.strategy);
        self.logger.log_decision(&decision, state);

        let outcome = self.selector.apply(&decision);

        let dispatched = self.dispatcher.dispatch(&decision).map_err(|e| {
            self.metrics.inc_dispatch_errors(e.kind().as_str());
            e
        })?;
        if let Dispatched::Sent { ref encoded, .. } = dispatched {
            self.metrics.inc_messages_dispatched();
            self.logger
                .log_dispatch(&decision.target_module, decision.strategy, encoded.len());
        }

        Ok((decision.strategy, outcome, dispatched))
    }
}

impl<T, R> ControlLoop<T, R>
where
    T: Transport + 'static,
    R: Rng + Send + 'static,
{
    /// Run cycles until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting control loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle();
                    if let Some(health) = self.health.clone() {
                        record_health(&health, &report).await;
                    }

                    debug!(
                        cycle = self.cycles,
                        modules = report.modules,
                        dispatched = report.dispatched,
                        suppressed = report.suppressed,
                        failures = report.failures,
                        rejected = report.rejected,
                        elapsed_us = report.elapsed.as_micros() as u64,
                        "Control cycle complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!(cycles = self.cycles, "Shutting down control loop");
                    break;
                }
            }
        }
    }
}

async fn record_health(health: &HealthRegistry, report: &CycleReport) {
    let message = (report.failures > 0).then(|| {
        format!(
            "{} of {} modules failed to adapt",
            report.failures, report.modules
        )
    });
    health
        .record_cycle(components::DISPATCHER, report.failures, message)
        .await;

    let rejected = usize::try_from(report.rejected).unwrap_or(usize::MAX);
    let message = (rejected > 0)
        .then(|| format!("{} reports rejected since last cycle", report.rejected));
    health
        .record_cycle(components::STORE, rejected, message)
        .await;
}

/// Builder for a control loop seeded from configuration
pub struct ControlLoopBuilder<T> {
    store: Option<Arc<MetricsStore>>,
    transport: Option<T>,
    analyzer: AnalyzerConfig,
    dispatch: DispatchConfig,
    config: ControlConfig,
    seed: Option<u64>,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl<T: Transport> ControlLoopBuilder<T> {
    pub fn new() -> Self {
        Self {
            store: None,
            transport: None,
            analyzer: AnalyzerConfig::default(),
            dispatch: DispatchConfig::default(),
            config: ControlConfig::default(),
            seed: None,
            logger: None,
            health: None,
        }
    }

    /// Set the shared metrics store
    pub fn store(mut self, store: Arc<MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the transport feedback is handed to
    pub fn transport(mut self, transport: T) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn analyzer(mut self, config: AnalyzerConfig) -> Self {
        self.analyzer = config;
        self
    }

    pub fn suppress_no_action(mut self, suppress: bool) -> Self {
        self.dispatch.suppress_no_action = suppress;
        self
    }

    /// Set the cycle interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Make strategy selection reproducible
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Build the control loop
    pub fn build(self) -> Result<ControlLoop<T, StdRng>> {
        let store = self
            .store
            .ok_or_else(|| ControlError::validation("store is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| ControlError::validation("transport is required"))?;
        self.analyzer.validate()?;
        if self.config.interval.is_zero() {
            return Err(ControlError::validation("control interval must be positive"));
        }

        let selector = match self.seed {
            Some(seed) => AdaptationSelector::seeded(seed),
            None => AdaptationSelector::new(),
        };

        let mut control = ControlLoop::new(
            store,
            PerformanceAnalyzer::new(self.analyzer),
            selector,
            FeedbackDispatcher::new(transport, self.dispatch),
            self.config,
        );
        if let Some(logger) = self.logger {
            control = control.with_logger(logger);
        }
        if let Some(health) = self.health {
            control = control.with_health(health);
        }
        Ok(control)
    }
}

impl<T: Transport> Default for ControlLoopBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{RecordingTransport, TransportError};
    use crate::health::ComponentStatus;
    use crate::models::{FeedbackStatus, MetricsSample};

    fn store_with(samples: &[(&str, f64, f64)]) -> Arc<MetricsStore> {
        let store = Arc::new(MetricsStore::new(100));
        for (id, accuracy, throughput) in samples {
            store
                .collect(MetricsSample::new(*id, 0.1, *accuracy, *throughput))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_control_config_default() {
        assert_eq!(ControlConfig::default().interval, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_requires_store_and_transport() {
        let missing_store = ControlLoopBuilder::new()
            .transport(RecordingTransport::new())
            .build();
        assert!(missing_store.is_err());

        let missing_transport = ControlLoopBuilder::<RecordingTransport>::new()
            .store(Arc::new(MetricsStore::default()))
            .build();
        assert!(missing_transport.is_err());

        let zero_interval = ControlLoopBuilder::new()
            .store(Arc::new(MetricsStore::default()))
            .transport(RecordingTransport::new())
            .interval(Duration::ZERO)
            .build();
        assert!(zero_interval.is_err());
    }

    #[test]
    fn test_cycle_on_empty_store() {
        let mut control = ControlLoopBuilder::new()
            .store(Arc::new(MetricsStore::default()))
            .transport(RecordingTransport::new())
            .build()
            .unwrap();

        let report = control.run_cycle();
        assert_eq!(report.modules, 0);
        assert_eq!(report.dispatched, 0);
        assert_eq!(control.cycles(), 1);
        assert!(control.dispatcher().transport().sent().is_empty());
    }

    #[test]
    fn test_cycle_dispatches_per_module() {
        let store = store_with(&[("a", 0.5, 10.0), ("b", 0.9, 500.0), ("c", 0.9, 10.0)]);
        let mut control = ControlLoopBuilder::new()
            .store(store)
            .transport(RecordingTransport::new())
            .seed(11)
            .build()
            .unwrap();

        let report = control.run_cycle();
        assert_eq!(report.modules, 3);
        assert_eq!(report.dispatched, 3);
        assert_eq!(report.failures, 0);
        assert_eq!(report.decisions_for(Strategy::Reconfigure), 1);
        assert_eq!(report.decisions_for(Strategy::NoAction), 1);
        assert_eq!(
            report.decisions_for(Strategy::Replace) + report.decisions_for(Strategy::Optimize),
            1
        );
        // no_action is not applied
        assert_eq!(report.applied, 2);
    }

    #[test]
    fn test_suppressed_no_action() {
        let store = store_with(&[("ok", 0.9, 10.0)]);
        let mut control = ControlLoopBuilder::new()
            .store(store)
            .transport(RecordingTransport::new())
            .suppress_no_action(true)
            .build()
            .unwrap();

        let report = control.run_cycle();
        assert_eq!(report.suppressed, 1);
        assert_eq!(report.dispatched, 0);
        assert!(control.dispatcher().transport().sent().is_empty());
    }

    #[test]
    fn test_failing_module_does_not_stop_cycle() {
        let store = store_with(&[("bad", 0.9, 500.0), ("good", 0.9, 500.0)]);
        let transport = |module_id: &str, _: &str| -> std::result::Result<(), TransportError> {
            if module_id == "bad" {
                Err(TransportError::new("unreachable"))
            } else {
                Ok(())
            }
        };
        let mut control = ControlLoopBuilder::new()
            .store(store)
            .transport(transport)
            .build()
            .unwrap();

        let report = control.run_cycle();
        assert_eq!(report.modules, 2);
        assert_eq!(report.failures, 1);
        assert_eq!(report.dispatched, 1);
    }

    #[test]
    fn test_submit_external_feedback() {
        let mut control = ControlLoopBuilder::new()
            .store(Arc::new(MetricsStore::default()))
            .transport(RecordingTransport::new())
            .build()
            .unwrap();

        let dispatched = control
            .submit_feedback(&Feedback::new("remote", FeedbackStatus::Warning))
            .unwrap();
        let message = dispatched.message().unwrap();
        assert_eq!(message.module_id, "remote");
        assert_eq!(message.payload["strategy"].as_str(), Some("reconfigure"));
    }

    #[test]
    fn test_cycle_prunes_history_outside_window() {
        let store = Arc::new(MetricsStore::new(2));
        store.collect(MetricsSample::new("a", 0.1, 0.9, 500.0)).unwrap();
        store.collect(MetricsSample::new("b", 0.1, 0.9, 500.0)).unwrap();
        let mut control = ControlLoopBuilder::new()
            .store(Arc::clone(&store))
            .transport(RecordingTransport::new())
            .build()
            .unwrap();

        control.run_cycle();
        assert_eq!(control.selector().tracked_modules(), 2);

        // Both earlier modules are evicted from the window
        store.collect(MetricsSample::new("c", 0.1, 0.9, 500.0)).unwrap();
        store.collect(MetricsSample::new("d", 0.1, 0.9, 500.0)).unwrap();
        control.run_cycle();

        assert_eq!(control.selector().tracked_modules(), 2);
        assert!(control.selector().last_applied("a").is_none());
        assert!(control.selector().last_applied("d").is_some());
    }

    #[tokio::test]
    async fn test_rejections_drive_store_health() {
        let store = Arc::new(MetricsStore::default());
        // Rejected before the loop exists; not counted against the first cycle
        assert!(store.collect(MetricsSample::new("m1", 0.1, 2.0, 1.0)).is_err());

        let health = HealthRegistry::new();
        health.register_all().await;
        let mut control = ControlLoopBuilder::new()
            .store(Arc::clone(&store))
            .transport(RecordingTransport::new())
            .build()
            .unwrap();

        assert!(store.collect(MetricsSample::new("m1", -1.0, 0.9, 1.0)).is_err());
        assert!(store.collect(MetricsSample::new("", 0.1, 0.9, 1.0)).is_err());
        let report = control.run_cycle();
        assert_eq!(report.rejected, 2);

        record_health(&health, &report).await;
        let status = health.health().await;
        assert_eq!(status.components[components::STORE].status, ComponentStatus::Degraded);
        assert_eq!(
            status.components[components::STORE].message.as_deref(),
            Some("2 reports rejected since last cycle")
        );
        assert_eq!(
            status.components[components::DISPATCHER].status,
            ComponentStatus::Healthy
        );

        let report = control.run_cycle();
        assert_eq!(report.rejected, 0);
        record_health(&health, &report).await;
        assert_eq!(health.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = store_with(&[("m1", 0.7, 10.0)]);
        let control = ControlLoopBuilder::new()
            .store(store)
            .transport(RecordingTransport::new())
            .interval(Duration::from_millis(10))
            .build()
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(control.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("control loop did not stop")
            .unwrap();
    }
}

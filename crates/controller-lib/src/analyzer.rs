//! Performance classification
//!
//! Classifies every module in the metrics window from its most recent
//! sample. Earlier samples for the same module are ignored; they are not
//! averaged or otherwise aggregated.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::codec::{self, Payload, Value};
use crate::error::{ControlError, Result};
use crate::models::{ClassificationResult, Feedback, FeedbackStatus, MetricsSample, ModuleState};
use crate::store::{MetricsStore, Snapshot};

/// Accuracy below which a module is underperforming
pub const DEFAULT_ACCURACY_FLOOR: f64 = 0.8;

/// Throughput above which a module is overloaded
pub const DEFAULT_THROUGHPUT_CEILING: f64 = 100.0;

/// Classification thresholds
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub accuracy_floor: f64,
    pub throughput_ceiling: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            accuracy_floor: DEFAULT_ACCURACY_FLOOR,
            throughput_ceiling: DEFAULT_THROUGHPUT_CEILING,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.accuracy_floor) {
            return Err(ControlError::validation(format!(
                "accuracy_floor must be within [0, 1], got {}",
                self.accuracy_floor
            )));
        }
        if !self.throughput_ceiling.is_finite() || self.throughput_ceiling < 0.0 {
            return Err(ControlError::validation(format!(
                "throughput_ceiling must be a finite non-negative number, got {}",
                self.throughput_ceiling
            )));
        }
        Ok(())
    }
}

/// Classifies modules from the metrics window
#[derive(Debug, Clone, Default)]
pub struct PerformanceAnalyzer {
    config: AnalyzerConfig,
}

impl PerformanceAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Classify a single sample; low accuracy takes precedence over load
    pub fn classify(&self, sample: &MetricsSample) -> ModuleState {
        if sample.accuracy < self.config.accuracy_floor {
            ModuleState::Underperforming
        } else if sample.throughput > self.config.throughput_ceiling {
            ModuleState::Overloaded
        } else {
            ModuleState::Operational
        }
    }

    /// Classify every module currently in the store
    pub fn analyze(&self, store: &MetricsStore) -> Analysis {
        self.analyze_snapshot(&store.snapshot())
    }

    pub fn analyze_snapshot(&self, snapshot: &Snapshot) -> Analysis {
        // Insertion order is oldest first, so the last write per module
        // is its most recent sample.
        let mut latest: BTreeMap<&str, &MetricsSample> = BTreeMap::new();
        for (module_id, sample) in snapshot.iter() {
            latest.insert(module_id, sample);
        }

        let modules = latest
            .into_iter()
            .map(|(module_id, sample)| {
                (
                    module_id.to_string(),
                    ModuleReport {
                        state: self.classify(sample),
                        latest: sample.clone(),
                    },
                )
            })
            .collect();

        Analysis {
            computed_at: snapshot.taken_at(),
            modules,
        }
    }
}

/// Classification of one module plus the sample that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleReport {
    pub state: ModuleState,
    pub latest: MetricsSample,
}

/// Result of one analysis pass
#[derive(Debug, Clone)]
pub struct Analysis {
    pub computed_at: DateTime<Utc>,
    pub modules: BTreeMap<String, ModuleReport>,
}

impl Analysis {
    /// Module id to state mapping
    pub fn states(&self) -> BTreeMap<String, ModuleState> {
        self.modules
            .iter()
            .map(|(id, report)| (id.clone(), report.state))
            .collect()
    }

    pub fn state(&self, module_id: &str) -> Option<ModuleState> {
        self.modules.get(module_id).map(|report| report.state)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn classifications(&self) -> impl Iterator<Item = ClassificationResult> + '_ {
        self.modules.iter().map(|(id, report)| ClassificationResult {
            module_id: id.clone(),
            state: report.state,
            computed_at: self.computed_at,
        })
    }

    /// One feedback signal per module, severity following its state
    pub fn feedback(&self) -> Vec<Feedback> {
        self.modules
            .iter()
            .map(|(id, report)| {
                Feedback::new(id.clone(), FeedbackStatus::from(report.state))
                    .with_detail("state", report.state.as_str())
                    .with_detail("latency", report.latest.latency.to_string())
                    .with_detail("accuracy", report.latest.accuracy.to_string())
                    .with_detail("throughput", report.latest.throughput.to_string())
            })
            .collect()
    }

    /// Number of modules in each state
    pub fn state_counts(&self) -> Vec<(ModuleState, usize)> {
        ModuleState::ALL
            .iter()
            .map(|state| {
                let count = self.modules.values().filter(|r| r.state == *state).count();
                (*state, count)
            })
            .collect()
    }

    /// Report form: `{"timestamp": ..., "analysis": {module_id: state}}`
    pub fn to_payload(&self) -> Payload {
        let analysis: Payload = self
            .modules
            .iter()
            .map(|(id, report)| (id.clone(), Value::from(report.state.as_str())))
            .collect();

        let mut payload = Payload::new();
        payload.insert(
            "timestamp".to_string(),
            Value::from(codec::iso_timestamp(self.computed_at)),
        );
        payload.insert("analysis".to_string(), Value::Map(analysis));
        payload
    }
}

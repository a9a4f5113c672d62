//! Core data models for the adaptation controller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ControlError;

/// One performance report from a monitored module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    pub module_id: String,
    /// Seconds, non-negative
    pub latency: f64,
    /// Fraction in [0, 1]
    pub accuracy: f64,
    /// Units of work per second, non-negative
    pub throughput: f64,
    pub received_at: DateTime<Utc>,
}

impl MetricsSample {
    /// Create a sample stamped with the current time
    pub fn new(module_id: impl Into<String>, latency: f64, accuracy: f64, throughput: f64) -> Self {
        Self {
            module_id: module_id.into(),
            latency,
            accuracy,
            throughput,
            received_at: Utc::now(),
        }
    }

    /// Check the declared ranges of every metric
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.module_id.is_empty() {
            return Err(ControlError::validation("module_id must not be empty"));
        }
        check_non_negative("latency", self.latency)?;
        check_non_negative("throughput", self.throughput)?;
        if !self.accuracy.is_finite() || !(0.0..=1.0).contains(&self.accuracy) {
            return Err(ControlError::validation(format!(
                "accuracy must be within [0, 1], got {}",
                self.accuracy
            )));
        }
        Ok(())
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), ControlError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ControlError::validation(format!(
            "{} must be a finite non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Operational state of a module derived from its latest sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    Underperforming,
    Overloaded,
    Operational,
}

impl ModuleState {
    pub const ALL: [ModuleState; 3] = [
        ModuleState::Underperforming,
        ModuleState::Overloaded,
        ModuleState::Operational,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Underperforming => "Underperforming",
            ModuleState::Overloaded => "Overloaded",
            ModuleState::Operational => "Operational",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one module at analysis time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub module_id: String,
    pub state: ModuleState,
    pub computed_at: DateTime<Utc>,
}

/// Severity of a feedback signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    Critical,
    Warning,
    Informational,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::Critical => "critical",
            FeedbackStatus::Warning => "warning",
            FeedbackStatus::Informational => "informational",
        }
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackStatus {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(FeedbackStatus::Critical),
            "warning" => Ok(FeedbackStatus::Warning),
            "informational" => Ok(FeedbackStatus::Informational),
            other => Err(ControlError::validation(format!(
                "unrecognized feedback status '{}'",
                other
            ))),
        }
    }
}

impl From<ModuleState> for FeedbackStatus {
    fn from(state: ModuleState) -> Self {
        match state {
            ModuleState::Underperforming => FeedbackStatus::Critical,
            ModuleState::Overloaded => FeedbackStatus::Warning,
            ModuleState::Operational => FeedbackStatus::Informational,
        }
    }
}

/// Signal about a module that drives strategy selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub target_module: String,
    pub status: FeedbackStatus,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl Feedback {
    pub fn new(target_module: impl Into<String>, status: FeedbackStatus) -> Self {
        Self {
            target_module: target_module.into(),
            status,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Corrective action chosen for a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Reconfigure,
    Replace,
    Optimize,
    NoAction,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Reconfigure,
        Strategy::Replace,
        Strategy::Optimize,
        Strategy::NoAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Reconfigure => "reconfigure",
            Strategy::Replace => "replace",
            Strategy::Optimize => "optimize",
            Strategy::NoAction => "no_action",
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, Strategy::NoAction)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ControlError::validation(format!("unrecognized strategy '{}'", s)))
    }
}

/// Strategy chosen for one module, ready for dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationDecision {
    pub strategy: Strategy,
    pub target_module: String,
    pub decided_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_validation_ranges() {
        assert!(MetricsSample::new("m1", 0.1, 0.9, 50.0).validate().is_ok());
        assert!(MetricsSample::new("m1", 0.0, 0.0, 0.0).validate().is_ok());
        assert!(MetricsSample::new("m1", 0.1, 1.0, 0.0).validate().is_ok());

        assert!(MetricsSample::new("m1", -0.1, 0.9, 50.0).validate().is_err());
        assert!(MetricsSample::new("m1", 0.1, 1.5, 50.0).validate().is_err());
        assert!(MetricsSample::new("m1", 0.1, -0.01, 50.0).validate().is_err());
        assert!(MetricsSample::new("m1", 0.1, 0.9, f64::NAN).validate().is_err());
        assert!(MetricsSample::new("m1", f64::INFINITY, 0.9, 1.0).validate().is_err());
        assert!(MetricsSample::new("", 0.1, 0.9, 1.0).validate().is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("critical".parse::<FeedbackStatus>().unwrap(), FeedbackStatus::Critical);
        assert_eq!("warning".parse::<FeedbackStatus>().unwrap(), FeedbackStatus::Warning);
        assert_eq!(
            "informational".parse::<FeedbackStatus>().unwrap(),
            FeedbackStatus::Informational
        );

        let err = "panic".parse::<FeedbackStatus>().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_strategy_names() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
        }
        assert_eq!(
            serde_json::to_string(&Strategy::NoAction).unwrap(),
            "\"no_action\""
        );
        assert!(!Strategy::NoAction.is_actionable());
        assert!(Strategy::Replace.is_actionable());
    }

    #[test]
    fn test_state_to_status() {
        assert_eq!(
            FeedbackStatus::from(ModuleState::Underperforming),
            FeedbackStatus::Critical
        );
        assert_eq!(FeedbackStatus::from(ModuleState::Overloaded), FeedbackStatus::Warning);
        assert_eq!(
            FeedbackStatus::from(ModuleState::Operational),
            FeedbackStatus::Informational
        );
    }
}

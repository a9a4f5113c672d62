//! Controller configuration

use anyhow::{ensure, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment};
use controller_lib::{
    analyzer::{AnalyzerConfig, DEFAULT_ACCURACY_FLOOR, DEFAULT_THROUGHPUT_CEILING},
    store::{StoreConfig, DEFAULT_CAPACITY},
};
use serde::Deserialize;
use std::time::Duration;

/// Controller configuration
///
/// Read from `CONTROLLER_*` environment variables; nested keys use `__`,
/// e.g. `CONTROLLER_CONTROL__INTERVAL_SECS=5`.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Name reported in structured logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub control: ControlSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub analyzer: AnalyzerSection,

    #[serde(default)]
    pub dispatch: DispatchSection,

    #[serde(default)]
    pub selector: SelectorSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlSection {
    /// Seconds between control cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerSection {
    #[serde(default = "default_accuracy_floor")]
    pub accuracy_floor: f64,

    #[serde(default = "default_throughput_ceiling")]
    pub throughput_ceiling: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSection {
    #[serde(default)]
    pub suppress_no_action: bool,

    /// Outbound feedback queued for the stdout writer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectorSection {
    /// Fixed seed for reproducible strategy choices
    pub seed: Option<u64>,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_interval_secs() -> u64 {
    10
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_accuracy_floor() -> f64 {
    DEFAULT_ACCURACY_FLOOR
}

fn default_throughput_ceiling() -> f64 {
    DEFAULT_THROUGHPUT_CEILING
}

fn default_buffer_size() -> usize {
    256
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            accuracy_floor: default_accuracy_floor(),
            throughput_ceiling: default_throughput_ceiling(),
        }
    }
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            suppress_no_action: false,
            buffer_size: default_buffer_size(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let env = Environment::with_prefix("CONTROLLER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);
        Self::from_builder(config::Config::builder().add_source(env))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.control.interval_secs > 0, "control.interval_secs must be positive");
        ensure!(self.dispatch.buffer_size > 0, "dispatch.buffer_size must be positive");
        self.store_config().validate()?;
        self.analyzer_config().validate()?;
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.control.interval_secs)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            capacity: self.store.capacity,
        }
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            accuracy_floor: self.analyzer.accuracy_floor,
            throughput_ceiling: self.analyzer.throughput_ceiling,
        }
    }
}

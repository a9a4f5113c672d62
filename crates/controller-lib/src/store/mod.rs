//! Bounded metrics window
//!
//! Holds the most recent samples from every module in a fixed-capacity ring
//! buffer with strict FIFO eviction. The buffer sits behind a mutex so that
//! concurrent producers and the analyzer's snapshot never observe it
//! mid-eviction.

mod ingest;
mod ring;

pub use ring::RingBuffer;

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::error::{ControlError, Result};
use crate::models::MetricsSample;
use crate::observability::ControllerMetrics;

/// Default number of samples kept in the window
pub const DEFAULT_CAPACITY: usize = 100;

/// Configuration for the metrics store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of samples retained across all modules
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ControlError::validation("store capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Mutable state guarded by the store's lock
#[derive(Debug)]
struct StoreInner {
    buffer: RingBuffer<Arc<MetricsSample>>,
    accepted: u64,
    rejected: u64,
    evicted: u64,
    last_rejection: Option<String>,
}

/// Bounded, ordered collection of metrics samples
#[derive(Debug)]
pub struct MetricsStore {
    inner: Mutex<StoreInner>,
    metrics: Option<ControllerMetrics>,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MetricsStore {
    /// Create a store retaining at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                buffer: RingBuffer::new(capacity),
                accepted: 0,
                rejected: 0,
                evicted: 0,
                last_rejection: None,
            }),
            metrics: None,
        }
    }

    /// Create a store from validated configuration
    pub fn with_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.capacity))
    }

    /// Report intake to Prometheus
    pub fn with_metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a validated sample, evicting the oldest when at capacity
    ///
    /// On a validation failure the window is left untouched and the cause
    /// is recorded in [`StoreStats::last_rejection`].
    pub fn collect(&self, sample: MetricsSample) -> Result<()> {
        if let Err(e) = sample.validate() {
            self.record_rejection(&e);
            return Err(e);
        }

        let module_id = sample.module_id.clone();
        let entries = {
            let mut inner = self.lock();
            if inner.buffer.push(Arc::new(sample)).is_some() {
                inner.evicted += 1;
            }
            inner.accepted += 1;
            inner.buffer.len()
        };

        debug!(module_id = %module_id, entries = entries, "Metrics collected");
        if let Some(ref metrics) = self.metrics {
            metrics.inc_samples_collected();
            metrics.set_store_entries(entries);
        }
        Ok(())
    }

    pub(crate) fn record_rejection(&self, error: &ControlError) {
        {
            let mut inner = self.lock();
            inner.rejected += 1;
            inner.last_rejection = Some(error.to_string());
        }
        warn!(kind = %error.kind(), error = %error, "Rejected metrics report");
        if let Some(ref metrics) = self.metrics {
            metrics.inc_samples_rejected(error.kind().as_str());
        }
    }

    /// Point-in-time copy of the window in insertion order
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            taken_at: Utc::now(),
            entries: inner.buffer.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().buffer.capacity()
    }

    /// Drop every retained sample; counters are kept
    pub fn clear(&self) {
        self.lock().buffer.clear();
        if let Some(ref metrics) = self.metrics {
            metrics.set_store_entries(0);
        }
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.lock();
        StoreStats {
            entries: inner.buffer.len(),
            capacity: inner.buffer.capacity(),
            accepted: inner.accepted,
            rejected: inner.rejected,
            evicted: inner.evicted,
            last_rejection: inner.last_rejection.clone(),
            oldest_sample_at: inner.buffer.front().map(|s| s.received_at),
            newest_sample_at: inner.buffer.back().map(|s| s.received_at),
        }
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Samples currently retained
    pub entries: usize,
    pub capacity: usize,
    /// Samples accepted since creation
    pub accepted: u64,
    /// Reports rejected since creation
    pub rejected: u64,
    /// Samples pushed out by newer ones
    pub evicted: u64,
    /// Cause of the most recent rejection
    pub last_rejection: Option<String>,
    pub oldest_sample_at: Option<DateTime<Utc>>,
    pub newest_sample_at: Option<DateTime<Utc>>,
}

/// Immutable copy of the metrics window
///
/// Iteration can be restarted any number of times and always yields the
/// samples as they were when the snapshot was taken.
#[derive(Debug, Clone)]
pub struct Snapshot {
    taken_at: DateTime<Utc>,
    entries: Arc<[Arc<MetricsSample>]>,
}

impl Snapshot {
    /// `(module_id, sample)` pairs from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricsSample)> + '_ {
        self.entries
            .iter()
            .map(|sample| (sample.module_id.as_str(), sample.as_ref()))
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

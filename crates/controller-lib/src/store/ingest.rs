//! Metrics ingestion from module reports

use tracing::debug;

use super::MetricsStore;
use crate::codec::{self, Payload};
use crate::error::{ControlError, Result};
use crate::models::MetricsSample;

/// Keys every metrics report must carry
pub const REQUIRED_METRICS: [&str; 3] = ["latency", "accuracy", "throughput"];

impl MetricsStore {
    /// Collect a raw metrics mapping reported by `module_id`
    pub fn collect_metrics(&self, module_id: &str, metrics: &Payload) -> Result<()> {
        let sample = match sample_from_payload(module_id, metrics) {
            Ok(sample) => sample,
            Err(e) => {
                self.record_rejection(&e);
                return Err(e);
            }
        };
        self.collect(sample)
    }

    /// Decode a wire message carrying a metrics report and collect it
    ///
    /// Returns the reporting module's id.
    pub fn ingest(&self, text: &str) -> Result<String> {
        let message = match codec::decode(text) {
            Ok(message) => message,
            Err(e) => {
                self.record_rejection(&e);
                return Err(e);
            }
        };
        debug!(module_id = %message.module_id, "Received metrics report");

        self.collect_metrics(&message.module_id, &message.payload)?;
        Ok(message.module_id)
    }
}

fn sample_from_payload(module_id: &str, metrics: &Payload) -> Result<MetricsSample> {
    let [latency, accuracy, throughput] = REQUIRED_METRICS;
    Ok(MetricsSample::new(
        module_id,
        read_metric(metrics, latency)?,
        read_metric(metrics, accuracy)?,
        read_metric(metrics, throughput)?,
    ))
}

fn read_metric(metrics: &Payload, key: &str) -> Result<f64> {
    let value = metrics
        .get(key)
        .ok_or_else(|| ControlError::validation(format!("missing required metric '{}'", key)))?;

    value.as_f64().ok_or_else(|| {
        ControlError::validation(format!(
            "metric '{}' must be a number, got {}",
            key,
            value.type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;

    fn metrics(latency: f64, accuracy: f64, throughput: f64) -> Payload {
        let mut payload = Payload::new();
        payload.insert("latency".to_string(), Value::Float(latency));
        payload.insert("accuracy".to_string(), Value::Float(accuracy));
        payload.insert("throughput".to_string(), Value::Float(throughput));
        payload
    }

    #[test]
    fn test_collect_metrics_accepts_valid_mapping() {
        let store = MetricsStore::new(10);
        store
            .collect_metrics("module_1", &metrics(0.1, 0.85, 90.0))
            .unwrap();

        let snapshot = store.snapshot();
        let (id, sample) = snapshot.iter().next().unwrap();
        assert_eq!(id, "module_1");
        assert_eq!(sample.accuracy, 0.85);
        assert_eq!(sample.throughput, 90.0);
    }

    #[test]
    fn test_integer_metrics_are_numbers() {
        let store = MetricsStore::new(10);
        let mut payload = Payload::new();
        payload.insert("latency".to_string(), Value::Int(0));
        payload.insert("accuracy".to_string(), Value::Int(1));
        payload.insert("throughput".to_string(), Value::Int(120));

        store.collect_metrics("m", &payload).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_or_mistyped_metric() {
        let store = MetricsStore::new(10);

        let mut missing = metrics(0.1, 0.9, 10.0);
        missing.remove("throughput");
        let err = store.collect_metrics("m", &missing).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("throughput"));

        let mut mistyped = metrics(0.1, 0.9, 10.0);
        mistyped.insert("latency".to_string(), Value::from("fast"));
        assert!(store.collect_metrics("m", &mistyped).unwrap_err().is_validation());

        assert!(store.is_empty());
        assert_eq!(store.stats().rejected, 2);
    }

    #[test]
    fn test_out_of_range_accuracy_rejected() {
        let store = MetricsStore::new(10);
        let err = store
            .collect_metrics("m", &metrics(0.1, 1.5, 10.0))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(store.is_empty());
    }

    #[test]
    fn test_ingest_wire_message() {
        let store = MetricsStore::new(10);
        let id = store
            .ingest(r#"{"module_id":"m7","payload":{"latency":0.2,"accuracy":0.95,"throughput":12}}"#)
            .unwrap();
        assert_eq!(id, "m7");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ingest_errors_keep_their_kind() {
        let store = MetricsStore::new(10);
        assert!(store.ingest("garbage").unwrap_err().is_decoding());
        assert!(store.ingest(r#"{"payload":{}}"#).unwrap_err().is_validation());
        assert!(store
            .ingest(r#"{"module_id":"m","payload":{"latency":0.1}}"#)
            .unwrap_err()
            .is_validation());

        // Later well-formed input is still accepted
        store
            .ingest(r#"{"module_id":"m","payload":{"latency":0.1,"accuracy":0.9,"throughput":1}}"#)
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().rejected, 3);
    }
}

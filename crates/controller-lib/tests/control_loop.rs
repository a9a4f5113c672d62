//! End-to-end tests for the collect → analyze → select → dispatch loop

use controller_lib::{
    adaptation::AdaptationSelector,
    analyzer::PerformanceAnalyzer,
    codec::{self, Payload, Value},
    control::ControlLoopBuilder,
    dispatch::{ChannelTransport, DispatchConfig, FeedbackDispatcher, RecordingTransport, TransportError},
    models::{Feedback, FeedbackStatus, MetricsSample, ModuleState, Strategy},
    store::MetricsStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn metrics(latency: f64, accuracy: f64, throughput: f64) -> Payload {
    let mut payload = Payload::new();
    payload.insert("latency".to_string(), Value::from(latency));
    payload.insert("accuracy".to_string(), Value::from(accuracy));
    payload.insert("throughput".to_string(), Value::from(throughput));
    payload
}

#[test]
fn test_degrading_module_is_replaced_or_optimized() {
    let store = MetricsStore::default();
    for accuracy in [0.95, 0.85, 0.7] {
        store.collect_metrics("m1", &metrics(0.1, accuracy, 10.0)).unwrap();
    }

    let analysis = PerformanceAnalyzer::default().analyze(&store);
    assert_eq!(analysis.state("m1"), Some(ModuleState::Underperforming));

    let mut selector = AdaptationSelector::seeded(2024);
    let decision = selector
        .select(&Feedback::new("m1", FeedbackStatus::Critical))
        .unwrap();
    assert!(matches!(decision.strategy, Strategy::Replace | Strategy::Optimize));

    let dispatcher = FeedbackDispatcher::new(RecordingTransport::new(), DispatchConfig::default());
    dispatcher.dispatch(&decision).unwrap();

    let sent = dispatcher.transport().sent();
    assert_eq!(sent.len(), 1);
    let (module_id, encoded) = &sent[0];
    assert_eq!(module_id, "m1");

    let message = codec::decode(encoded).unwrap();
    assert_eq!(message.payload["target_module"].as_str(), Some("m1"));
    assert_eq!(
        message.payload["strategy"].as_str(),
        Some(decision.strategy.as_str())
    );
}

#[test]
fn test_rejected_input_does_not_stop_later_cycles() {
    let store = Arc::new(MetricsStore::new(10));
    let mut control = ControlLoopBuilder::new()
        .store(Arc::clone(&store))
        .transport(RecordingTransport::new())
        .seed(5)
        .build()
        .unwrap();

    assert!(store.ingest("not valid syntax").unwrap_err().is_decoding());
    assert!(store.ingest(r#"{"payload":{}}"#).unwrap_err().is_validation());
    assert!(store
        .collect_metrics("m1", &metrics(0.1, 1.5, 10.0))
        .unwrap_err()
        .is_validation());
    assert!(store.is_empty());
    assert_eq!(store.stats().rejected, 3);

    let first = control.run_cycle();
    assert_eq!(first.modules, 0);

    store
        .ingest(r#"{"module_id":"m1","payload":{"latency":0.2,"accuracy":0.9,"throughput":150}}"#)
        .unwrap();
    let second = control.run_cycle();
    assert_eq!(second.modules, 1);
    assert_eq!(second.decisions_for(Strategy::Reconfigure), 1);

    let sent = control.dispatcher().transport().sent();
    assert_eq!(sent.len(), 1);
    let message = codec::decode(&sent[0].1).unwrap();
    assert_eq!(message.payload["strategy"].as_str(), Some("reconfigure"));
}

#[test]
fn test_transport_failure_is_isolated_to_one_module() {
    let store = Arc::new(MetricsStore::default());
    for id in ["alpha", "beta", "gamma"] {
        store.collect(MetricsSample::new(id, 0.1, 0.9, 50.0)).unwrap();
    }

    let transport = |module_id: &str, _: &str| -> Result<(), TransportError> {
        if module_id == "beta" {
            Err(TransportError::new("connection refused"))
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
    assert_eq!(report.modules, 3);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.failures, 1);
}

#[tokio::test]
async fn test_running_loop_delivers_feedback_over_channel() {
    let store = Arc::new(MetricsStore::default());
    store.collect(MetricsSample::new("m7", 0.1, 0.6, 20.0)).unwrap();

    let (transport, mut outbound) = ChannelTransport::new(16);
    let control = ControlLoopBuilder::new()
        .store(Arc::clone(&store))
        .transport(transport)
        .interval(Duration::from_millis(20))
        .seed(9)
        .build()
        .unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(control.run(shutdown_rx));

    let delivered = tokio::time::timeout(Duration::from_secs(2), outbound.recv())
        .await
        .expect("no feedback delivered")
        .expect("channel closed");
    assert_eq!(delivered.module_id, "m7");

    let message = codec::decode(&delivered.encoded).unwrap();
    let strategy = message.payload["strategy"].as_str().unwrap();
    assert!(strategy == "replace" || strategy == "optimize");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("control loop did not stop")
        .unwrap();
}

//! Adaptive Controller - closed-loop performance monitor
//!
//! Reads module metrics reports from stdin, classifies each module on a
//! fixed interval, and writes adaptation feedback to stdout.

use anyhow::Result;
use controller_lib::{
    control::ControlLoopBuilder,
    dispatch::ChannelTransport,
    health::HealthRegistry,
    observability::{ControllerMetrics, StructuredLogger},
    store::MetricsStore,
};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod streams;

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries feedback
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let config = config::ControllerConfig::load()?;
    info!(node_name = %config.node_name, "Controller configured");

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = ControllerMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    let store = Arc::new(MetricsStore::with_config(&config.store_config())?.with_metrics(metrics.clone()));
    let (transport, outbound) = ChannelTransport::new(config.dispatch.buffer_size);

    let mut builder = ControlLoopBuilder::new()
        .store(Arc::clone(&store))
        .transport(transport)
        .analyzer(config.analyzer_config())
        .suppress_no_action(config.dispatch.suppress_no_action)
        .interval(config.interval())
        .logger(logger.clone())
        .health(health_registry.clone());
    if let Some(seed) = config.selector.seed {
        builder = builder.seed(seed);
    }
    let control = builder.build()?;

    // Fails startup before any task runs if the port is taken
    let listener = api::bind(config.api_port).await?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let writer_handle = tokio::spawn(streams::write_feedback(outbound, tokio::io::stdout()));
    let ingest_handle = tokio::spawn(streams::ingest_lines(
        BufReader::new(tokio::io::stdin()),
        Arc::clone(&store),
        logger.clone(),
        shutdown_tx.subscribe(),
    ));
    let control_handle = tokio::spawn(control.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        Arc::clone(&store),
    ));
    let mut api_handle = tokio::spawn(api::serve(listener, app_state));

    health_registry.set_ready(true).await;
    logger.log_startup(CONTROLLER_VERSION, store.capacity());

    let api_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            None
        }
        served = &mut api_handle => {
            logger.log_shutdown("API server stopped");
            Some(served)
        }
    };
    health_registry.set_ready(false).await;

    // Receivers may already be gone if stdin closed
    let _ = shutdown_tx.send(());

    // The loop finishes its current cycle, then drops the transport
    control_handle.await?;
    match ingest_handle.await? {
        Ok(summary) => info!(lines = summary.lines, accepted = summary.accepted, "Ingestion stopped"),
        Err(e) => warn!(error = %e, "Ingestion failed"),
    }
    let written = writer_handle.await??;
    info!(feedback_written = written, "Shutdown complete");

    match api_exit {
        // A server that stopped on its own makes the exit non-zero
        Some(served) => {
            served??;
            anyhow::bail!("API server exited unexpectedly")
        }
        None => {
            api_handle.abort();
            Ok(())
        }
    }
}

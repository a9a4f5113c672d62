//! Stdin metrics intake and stdout feedback output
//!
//! Modules report as JSON lines on stdin, one wire message per line.
//! Feedback leaves the controller as JSON lines on stdout.

use controller_lib::{
    dispatch::Outbound, observability::StructuredLogger, store::MetricsStore,
};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Lines read and lines accepted by [`ingest_lines`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub lines: u64,
    pub accepted: u64,
}

/// Collect every metrics report from `reader` until EOF or shutdown
///
/// Rejected lines are logged and skipped.
pub async fn ingest_lines<R>(
    reader: R,
    store: Arc<MetricsStore>,
    logger: StructuredLogger,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut summary = IngestSummary::default();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown.recv() => break,
        };
        let Some(line) = line else {
            info!(lines = summary.lines, "Metrics input closed");
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines += 1;

        match store.ingest(line) {
            Ok(module_id) => {
                summary.accepted += 1;
                debug!(module_id = %module_id, "Report ingested");
            }
            Err(e) => logger.log_rejection("stdin", e.kind().as_str(), &e.to_string()),
        }
    }

    Ok(summary)
}

/// Write each outbound message as one line until every sender is gone
pub async fn write_feedback<W>(mut rx: mpsc::Receiver<Outbound>, mut writer: W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(outbound) = rx.recv().await {
        writer.write_all(outbound.encoded.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_lib::dispatch::{ChannelTransport, Transport};

    #[tokio::test]
    async fn test_ingest_skips_bad_lines() {
        let input = concat!(
            r#"{"module_id":"m1","payload":{"latency":0.1,"accuracy":0.9,"throughput":20}}"#,
            "\n",
            "not valid syntax\n",
            "\n",
            r#"{"payload":{}}"#,
            "\n",
            r#"{"module_id":"m2","payload":{"latency":0.3,"accuracy":0.5,"throughput":5}}"#,
            "\n",
        );
        let store = Arc::new(MetricsStore::default());
        let (_tx, rx) = broadcast::channel(1);

        let summary = ingest_lines(
            input.as_bytes(),
            Arc::clone(&store),
            StructuredLogger::new("test"),
            rx,
        )
        .await
        .unwrap();

        assert_eq!(summary, IngestSummary { lines: 4, accepted: 2 });
        let ids: Vec<String> = store
            .snapshot()
            .iter()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(store.stats().rejected, 2);
    }

    #[tokio::test]
    async fn test_write_feedback_one_line_per_message() {
        let (transport, rx) = ChannelTransport::new(4);
        transport.send("m1", r#"{"a":1}"#).unwrap();
        transport.send("m2", r#"{"b":2}"#).unwrap();
        drop(transport);

        let mut out = Vec::new();
        let written = write_feedback(rx, &mut out).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "{\"a\":1}\n{\"b\":2}\n");
    }
}

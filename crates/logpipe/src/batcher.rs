// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch sender: drains the ring into the transport.

use crate::pipeline::LogPipeline;
use crate::PipelineError;
use hive_core::LogEntry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Transport-facing side of the pipeline.
///
/// Implemented by the worker wiring over the real transport; delivery
/// must be idempotent downstream (dedup by `(run_id, seq)`), so resends
/// after partial failure are safe.
#[async_trait::async_trait]
pub trait LogBatchTransport: Send + Sync {
    async fn send_log_batch(&self, entries: &[LogEntry]) -> Result<(), PipelineError>;
}

/// Batch sender tuning.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Pause after a failed send before retrying.
    pub retry_backoff: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_millis(500),
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Drains a pipeline into a [`LogBatchTransport`] until cancelled.
pub struct BatchSender {
    pipeline: Arc<LogPipeline>,
    transport: Arc<dyn LogBatchTransport>,
    config: BatcherConfig,
}

impl BatchSender {
    pub fn new(
        pipeline: Arc<LogPipeline>,
        transport: Arc<dyn LogBatchTransport>,
        config: BatcherConfig,
    ) -> Self {
        Self { pipeline, transport, config }
    }

    /// Run the send loop until `cancel` fires, then make a final drain
    /// attempt so short-lived runs don't lose their tail to timing.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.pipeline.wait_for_data(self.config.flush_interval) => {}
            }
            if let Err(e) = self.send_once().await {
                warn!(run_id = %self.pipeline.run_id(), error = %e, "log batch send failed");
                // acked_seq stays frozen; the WAL keeps everything.
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }
        let _ = self.drain().await;
    }

    /// Send at most one batch. No-op when the ring is empty.
    pub async fn send_once(&self) -> Result<usize, PipelineError> {
        let batch = self.pipeline.drain_batch(self.config.batch_size);
        if batch.is_empty() {
            return Ok(0);
        }
        self.send_and_ack(&batch).await?;
        Ok(batch.len())
    }

    /// Drain the ring completely, then re-emit anything the transport
    /// never confirmed. Used on run completion and on reconnect
    /// (`recover_from_spool` semantics).
    pub async fn drain(&self) -> Result<usize, PipelineError> {
        let mut sent = 0;
        loop {
            let n = self.send_once().await?;
            if n == 0 {
                break;
            }
            sent += n;
        }
        sent += self.recover_from_spool().await?;
        Ok(sent)
    }

    /// Re-emit entries in `(acked_seq, last_seq]` in order.
    ///
    /// Called after a transport reconnect. Downstream dedup by
    /// `(run_id, seq)` makes the inevitable overlap harmless.
    pub async fn recover_from_spool(&self) -> Result<usize, PipelineError> {
        let unacked = self.pipeline.unacked()?;
        if unacked.is_empty() {
            return Ok(0);
        }
        debug!(
            run_id = %self.pipeline.run_id(),
            count = unacked.len(),
            "re-emitting unacked log entries from spool"
        );
        let mut sent = 0;
        for chunk in unacked.chunks(self.config.batch_size.max(1)) {
            self.send_and_ack(chunk).await?;
            sent += chunk.len();
        }
        Ok(sent)
    }

    async fn send_and_ack(&self, batch: &[LogEntry]) -> Result<(), PipelineError> {
        self.transport.send_log_batch(batch).await?;
        if let Some(max_seq) = batch.iter().map(|e| e.seq).max() {
            self.pipeline.ack(max_seq)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "batcher_tests.rs"]
mod tests;

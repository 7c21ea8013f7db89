// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run pipeline: WAL-backed ring buffer with backpressure.

use crate::backpressure::{BackpressureConfig, BackpressureGauge, QueueState};
use crate::spool::Spool;
use crate::wal::RunWal;
use crate::PipelineError;
use hive_core::{LogEntry, RunId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// What happened to a pushed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued for timely delivery.
    Accepted,
    /// Dropped from the live queue per the critical-pressure policy.
    /// The WAL still holds the line for forensics, but timely delivery
    /// is forfeited and `total_dropped` is incremented.
    Dropped,
}

/// Pipeline tuning.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub backpressure: BackpressureConfig,
}

/// Point-in-time pipeline counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineMetrics {
    pub depth: usize,
    pub state: QueueState,
    pub total_dropped: u64,
    pub last_seq: u64,
    pub acked_seq: u64,
}

/// Durable per-run log pipeline.
///
/// Producers call [`LogPipeline::push`]; the batch sender drains with
/// [`LogPipeline::drain_batch`] and confirms delivery with
/// [`LogPipeline::ack`]. Every entry hits the WAL before the ring, so a
/// crash or disconnect can only delay delivery, never lose lines.
pub struct LogPipeline {
    run_id: RunId,
    spool: Mutex<Spool>,
    ring: Mutex<VecDeque<LogEntry>>,
    gauge: Arc<BackpressureGauge>,
    space: Notify,
    data: Notify,
}

impl LogPipeline {
    /// Open (or re-open after restart) the pipeline for a run.
    pub fn open(
        wal_root: &Path,
        spool_root: &Path,
        run_id: RunId,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let wal = RunWal::open(wal_root, run_id)?;
        let spool = Spool::open(spool_root, wal)?;
        Ok(Self {
            run_id,
            spool: Mutex::new(spool),
            ring: Mutex::new(VecDeque::new()),
            gauge: Arc::new(BackpressureGauge::new(config.backpressure)),
            space: Notify::new(),
            data: Notify::new(),
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn gauge(&self) -> &Arc<BackpressureGauge> {
        &self.gauge
    }

    /// Append an entry: WAL first, then the live ring.
    ///
    /// At CRITICAL with `drop_on_critical`, the entry skips the ring
    /// (counted in `total_dropped`). At BLOCKED without the drop policy,
    /// awaits space — producers slow to the sender's pace.
    pub async fn push(&self, entry: LogEntry) -> Result<PushOutcome, PipelineError> {
        self.spool.lock().append(&entry)?;

        loop {
            let depth = self.ring.lock().len();
            if self.gauge.should_drop(depth) {
                self.gauge.record_dropped();
                self.gauge.observe(depth);
                return Ok(PushOutcome::Dropped);
            }
            if depth >= self.gauge.config().max_queue_size {
                // Blocked: wait for the sender to make room.
                self.gauge.observe(depth);
                self.space.notified().await;
                continue;
            }
            let mut ring = self.ring.lock();
            // Re-check under the lock; a racing producer may have filled
            // the last slot between the depth read and now.
            if ring.len() >= self.gauge.config().max_queue_size {
                continue;
            }
            ring.push_back(entry);
            let depth = ring.len();
            drop(ring);
            self.gauge.observe(depth);
            self.data.notify_one();
            return Ok(PushOutcome::Accepted);
        }
    }

    /// Pop up to `max` entries for sending.
    pub fn drain_batch(&self, max: usize) -> Vec<LogEntry> {
        let mut ring = self.ring.lock();
        let take = max.min(ring.len());
        let batch: Vec<LogEntry> = ring.drain(..take).collect();
        let depth = ring.len();
        drop(ring);
        if !batch.is_empty() {
            self.gauge.observe(depth);
            self.space.notify_waiters();
        }
        batch
    }

    /// Wait until data is available or the timeout elapses.
    pub async fn wait_for_data(&self, timeout: Duration) {
        if !self.ring.lock().is_empty() {
            return;
        }
        let _ = tokio::time::timeout(timeout, self.data.notified()).await;
    }

    /// Confirm delivery up to `seq` (inclusive).
    pub fn ack(&self, seq: u64) -> Result<(), PipelineError> {
        self.spool.lock().ack(seq)
    }

    /// Flush WAL buffers and persist cursors.
    pub fn flush(&self) -> Result<(), PipelineError> {
        self.spool.lock().flush()
    }

    /// Entries the transport has not confirmed, in seq order.
    pub fn unacked(&self) -> Result<Vec<LogEntry>, PipelineError> {
        self.spool.lock().iter_unacked()
    }

    /// Whether everything written has been confirmed.
    pub fn fully_acked(&self) -> bool {
        self.spool.lock().fully_acked()
    }

    pub fn metrics(&self) -> PipelineMetrics {
        let (last_seq, acked_seq) = {
            let spool = self.spool.lock();
            (spool.last_seq(), spool.acked_seq())
        };
        let depth = self.ring.lock().len();
        PipelineMetrics {
            depth,
            state: self.gauge.state(),
            total_dropped: self.gauge.total_dropped(),
            last_seq,
            acked_seq,
        }
    }

    /// Stream files for archival.
    pub fn wal_files(&self) -> Vec<(hive_core::LogStream, std::path::PathBuf)> {
        self.spool.lock().wal().stream_files()
    }

    /// Tear down on-disk state. Call after full ack (or deliberate
    /// discard); drops anything still buffered.
    pub fn purge(self) -> Result<(), PipelineError> {
        self.spool.into_inner().purge()
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

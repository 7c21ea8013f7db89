// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hive-logpipe: durable per-run log delivery.
//!
//! Per run: `source → WAL append → in-memory ring → batch sender →
//! transport`. The WAL plus spool cursors guarantee that no log line is
//! lost across disconnections or worker restarts; delivery is
//! at-least-once with downstream dedup by `(run_id, seq)`.

mod archive;
mod backpressure;
mod batcher;
mod pipeline;
mod spool;
mod wal;

pub use archive::{archive_run, ArchiveConfig};
pub use backpressure::{BackpressureConfig, BackpressureGauge, QueueState, StateListener};
pub use batcher::{BatchSender, BatcherConfig, LogBatchTransport};
pub use pipeline::{LogPipeline, PipelineConfig, PipelineMetrics, PushOutcome};
pub use spool::{Spool, SpoolMeta};
pub use wal::RunWal;

/// Errors from the log pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("log queue is full")]
    QueueFull,

    #[error("pipeline for run {0} is closed")]
    Closed(String),

    #[error("transport rejected log batch: {0}")]
    SendRejected(String),

    #[error("archive upload failed with status {0}")]
    UploadFailed(u16),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

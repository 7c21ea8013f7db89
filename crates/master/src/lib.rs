// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hive-master: batch-scoped crawl orchestration.
//!
//! The master side of the system: a worker registry with
//! heartbeat-driven offline detection, a multi-priority crawl queue
//! with Bloom dedup and dead-lettering, the batch lifecycle machine,
//! and the dispatcher that places tasks on workers by load score.

pub mod backend;
pub mod batch;
pub mod bloom;
pub mod dispatcher;
pub mod queue;
pub mod registry;

pub use backend::{MemoryBackend, QueueBackend, QueueDelivery, RedisBackend};
pub use batch::{BatchService, BatchSummary};
pub use bloom::{BloomFilter, DedupFilters};
pub use dispatcher::{
    ArtifactMeta, ArtifactSync, Dispatcher, DispatchReport, ReadyStreamSink, RedisReadySink,
    SelectionFilter, WorkerSnapshot,
};
pub use queue::{advance_status, CrawlQueueService, EnqueueReport, QueueConfig, QueueStats};
pub use registry::{run_sweeper, MemoryRegistry, RedisRegistry, Registry, RegistryConfig};

/// Errors from master-side orchestration.
#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    #[error("batch {0} not found")]
    BatchNotFound(String),

    #[error("invalid batch transition {from} → {to}")]
    InvalidBatchTransition { from: hive_core::BatchStatus, to: hive_core::BatchStatus },

    #[error("invalid crawl task transition {from} → {to}")]
    InvalidCrawlTransition { from: hive_core::CrawlTaskStatus, to: hive_core::CrawlTaskStatus },

    #[error("worker {0} not registered")]
    WorkerNotFound(String),

    #[error("no eligible worker for dispatch")]
    NoEligibleWorker,

    #[error("artifact sync failed for {project_id}: {detail}")]
    ArtifactSync { project_id: String, detail: String },

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Transport(#[from] hive_transport::TransportError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

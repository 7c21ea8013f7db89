// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawl batch entity and state machine.

use crate::id::BatchId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a crawl batch.
///
/// Terminal states (Completed, Failed, Cancelled) are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

crate::wire_enum! {
    BatchStatus {
        Pending => "pending",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Cancelled
        )
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition(&self, to: BatchStatus) -> bool {
        use BatchStatus::*;
        match (self, to) {
            (Pending, Running) => true,
            (Pending, Cancelled) => true,
            (Running, Paused) => true,
            (Running, Completed) => true,
            (Running, Failed) => true,
            (Running, Cancelled) => true,
            (Paused, Running) => true,
            (Paused, Cancelled) => true,
            _ => false,
        }
    }
}

/// Crawl limits for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub max_depth: u32,
    pub max_pages: u64,
    pub max_concurrency: u32,
    /// Delay between requests, milliseconds.
    pub request_delay_ms: u64,
    /// Per-request timeout, seconds.
    pub timeout_s: u64,
    pub max_retries: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_pages: 10_000,
            max_concurrency: 16,
            request_delay_ms: 0,
            timeout_s: 1_800,
            max_retries: 3,
        }
    }
}

impl BatchConfig {
    /// Caps applied to test batches: shallow, small, short.
    pub fn capped_for_test(mut self) -> Self {
        self.max_depth = self.max_depth.min(3);
        self.max_pages = self.max_pages.min(100);
        self.max_concurrency = self.max_concurrency.min(10);
        self.timeout_s = self.timeout_s.min(300);
        self
    }
}

/// Progress counters for a batch, checkpointed on pause and completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: u64,
}

/// One crawl batch: a scoped crawl over a project's seed URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlBatch {
    pub batch_id: BatchId,
    pub project_id: String,
    pub status: BatchStatus,
    pub seed_urls: Vec<String>,
    pub config: BatchConfig,
    /// Test batches run with capped limits and are cleaned up afterwards.
    #[serde(default)]
    pub is_test: bool,
    pub created_at_ms: u64,
    #[serde(default)]
    pub started_at_ms: Option<u64>,
    #[serde(default)]
    pub completed_at_ms: Option<u64>,
    #[serde(default)]
    pub progress: BatchProgress,
}

impl CrawlBatch {
    pub fn new(
        project_id: impl Into<String>,
        seed_urls: Vec<String>,
        config: BatchConfig,
        is_test: bool,
        now_ms: u64,
    ) -> Self {
        let config = if is_test { config.capped_for_test() } else { config };
        Self {
            batch_id: BatchId::new(),
            project_id: project_id.into(),
            status: BatchStatus::Pending,
            seed_urls,
            config,
            is_test,
            created_at_ms: now_ms,
            started_at_ms: None,
            completed_at_ms: None,
            progress: BatchProgress::default(),
        }
    }
}

crate::builder! {
    pub struct CrawlBatchBuilder => CrawlBatch {
        into {
            project_id: String = "proj-1",
        }
        set {
            status: BatchStatus = BatchStatus::Pending,
            seed_urls: Vec<String> = vec!["https://example.com/".to_string()],
            config: BatchConfig = BatchConfig::default(),
            is_test: bool = false,
            created_at_ms: u64 = 1_000_000,
            progress: BatchProgress = BatchProgress::default(),
        }
        option {
            started_at_ms: u64 = None,
            completed_at_ms: u64 = None,
        }
        computed {
            batch_id: BatchId = BatchId::new(),
        }
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawl batch lifecycle.
//!
//! Batch FSM with seed injection, progress checkpoints, pause/resume,
//! and test batches that run under capped limits and clean up after
//! themselves.

use crate::queue::CrawlQueueService;
use crate::MasterError;
use hive_core::{BatchConfig, BatchId, BatchProgress, BatchStatus, CrawlBatch, CrawlTask, Priority};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Listing row for admin surfaces.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub project_id: String,
    pub status: BatchStatus,
    pub is_test: bool,
    pub progress: BatchProgress,
}

pub struct BatchService {
    queue: Arc<CrawlQueueService>,
    batches: Mutex<HashMap<BatchId, CrawlBatch>>,
}

impl BatchService {
    pub fn new(queue: Arc<CrawlQueueService>) -> Self {
        Self { queue, batches: Mutex::new(HashMap::new()) }
    }

    /// Create a batch in PENDING. Test batches get capped limits.
    pub fn create(
        &self,
        project_id: impl Into<String>,
        seed_urls: Vec<String>,
        config: BatchConfig,
        is_test: bool,
        now_ms: u64,
    ) -> CrawlBatch {
        let batch = CrawlBatch::new(project_id, seed_urls, config, is_test, now_ms);
        info!(batch_id = %batch.batch_id, project_id = %batch.project_id, is_test, "created batch");
        self.batches.lock().insert(batch.batch_id, batch.clone());
        batch
    }

    pub fn get(&self, batch_id: &BatchId) -> Result<CrawlBatch, MasterError> {
        self.batches
            .lock()
            .get(batch_id)
            .cloned()
            .ok_or_else(|| MasterError::BatchNotFound(batch_id.to_string()))
    }

    pub fn list(&self) -> Vec<BatchSummary> {
        self.batches
            .lock()
            .values()
            .map(|b| BatchSummary {
                batch_id: b.batch_id,
                project_id: b.project_id.clone(),
                status: b.status,
                is_test: b.is_test,
                progress: b.progress.clone(),
            })
            .collect()
    }

    fn transition(&self, batch_id: &BatchId, to: BatchStatus) -> Result<CrawlBatch, MasterError> {
        let mut batches = self.batches.lock();
        let batch = batches
            .get_mut(batch_id)
            .ok_or_else(|| MasterError::BatchNotFound(batch_id.to_string()))?;
        if !batch.status.can_transition(to) {
            warn!(batch_id = %batch_id, from = %batch.status, to = %to, "rejected batch transition");
            return Err(MasterError::InvalidBatchTransition { from: batch.status, to });
        }
        batch.status = to;
        Ok(batch.clone())
    }

    /// PENDING → RUNNING: ensure queues, init progress with the seed
    /// count, inject seeds with dedup skipped.
    pub async fn start(&self, batch_id: &BatchId, now_ms: u64) -> Result<CrawlBatch, MasterError> {
        let batch = self.transition(batch_id, BatchStatus::Running)?;
        self.queue.ensure_queues(&batch.project_id).await?;

        let seeds: Vec<CrawlTask> = batch
            .seed_urls
            .iter()
            .map(|url| CrawlTask::seed(url, batch.batch_id.as_str(), now_ms))
            .collect();
        let report = self
            .queue
            .enqueue_urls(&batch.project_id, seeds, Priority::High, true)
            .await?;

        let mut batches = self.batches.lock();
        if let Some(stored) = batches.get_mut(batch_id) {
            stored.started_at_ms = Some(now_ms);
            stored.progress = BatchProgress {
                total: batch.seed_urls.len() as u64,
                ..BatchProgress::default()
            };
            info!(
                batch_id = %batch_id,
                seeds = report.enqueued,
                "batch started"
            );
            return Ok(stored.clone());
        }
        Err(MasterError::BatchNotFound(batch_id.to_string()))
    }

    /// RUNNING → PAUSED: checkpoint progress; in-flight tasks continue.
    pub fn pause(&self, batch_id: &BatchId, progress: BatchProgress) -> Result<CrawlBatch, MasterError> {
        let batch = self.transition(batch_id, BatchStatus::Paused)?;
        let mut batches = self.batches.lock();
        if let Some(stored) = batches.get_mut(batch_id) {
            stored.progress = progress;
            info!(batch_id = %batch_id, "batch paused");
            return Ok(stored.clone());
        }
        drop(batches);
        Ok(batch)
    }

    /// PAUSED → RUNNING: restore from the checkpoint.
    pub fn resume(&self, batch_id: &BatchId) -> Result<CrawlBatch, MasterError> {
        let batch = self.transition(batch_id, BatchStatus::Running)?;
        info!(batch_id = %batch_id, "batch resumed");
        Ok(batch)
    }

    /// Any non-terminal → CANCELLED, optionally purging queues,
    /// progress, and the dedup filter.
    pub async fn cancel(
        &self,
        batch_id: &BatchId,
        purge: bool,
        now_ms: u64,
    ) -> Result<CrawlBatch, MasterError> {
        let batch = self.transition(batch_id, BatchStatus::Cancelled)?;
        if purge {
            self.queue.purge(&batch.project_id).await?;
        }
        let mut batches = self.batches.lock();
        if let Some(stored) = batches.get_mut(batch_id) {
            stored.completed_at_ms = Some(now_ms);
            if purge {
                stored.progress = BatchProgress::default();
            }
            info!(batch_id = %batch_id, purge, "batch cancelled");
            return Ok(stored.clone());
        }
        drop(batches);
        Ok(batch)
    }

    /// RUNNING → COMPLETED (success) or FAILED; final checkpoint either
    /// way.
    pub fn complete(
        &self,
        batch_id: &BatchId,
        success: bool,
        progress: BatchProgress,
        now_ms: u64,
    ) -> Result<CrawlBatch, MasterError> {
        let to = if success { BatchStatus::Completed } else { BatchStatus::Failed };
        let batch = self.transition(batch_id, to)?;
        let mut batches = self.batches.lock();
        if let Some(stored) = batches.get_mut(batch_id) {
            stored.completed_at_ms = Some(now_ms);
            stored.progress = progress;
            info!(batch_id = %batch_id, status = %to, "batch finished");
            return Ok(stored.clone());
        }
        drop(batches);
        Ok(batch)
    }

    /// Record progress counter updates (called by result ingestion).
    pub fn update_progress(
        &self,
        batch_id: &BatchId,
        update: impl FnOnce(&mut BatchProgress),
    ) -> Result<BatchProgress, MasterError> {
        let mut batches = self.batches.lock();
        let batch = batches
            .get_mut(batch_id)
            .ok_or_else(|| MasterError::BatchNotFound(batch_id.to_string()))?;
        update(&mut batch.progress);
        Ok(batch.progress.clone())
    }

    /// Tear down a finished test batch: purge queues and drop the
    /// record. No-op for non-test batches.
    pub async fn cleanup_test_batch(&self, batch_id: &BatchId) -> Result<bool, MasterError> {
        let batch = self.get(batch_id)?;
        if !batch.is_test || !batch.status.is_terminal() {
            return Ok(false);
        }
        self.queue.purge(&batch.project_id).await?;
        self.batches.lock().remove(batch_id);
        info!(batch_id = %batch_id, "cleaned up test batch");
        Ok(true)
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;

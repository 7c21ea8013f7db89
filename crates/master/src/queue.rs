// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawl multi-priority queue service.
//!
//! Three ready streams per project (HIGH/NORMAL/LOW) plus a dead-letter
//! stream, over a pluggable backend. Enqueue dedups through a Bloom
//! filter; retries re-enqueue at the original priority until the retry
//! budget is spent; reclaimed entries past the budget dead-letter.

use crate::backend::{QueueBackend, QueueDelivery};
use crate::bloom::DedupFilters;
use crate::MasterError;
use hive_core::{CrawlTask, CrawlTaskStatus, Priority};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Queue-service tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_retries: u32,
    /// Idle threshold before reclaim re-delivers.
    pub min_idle: Duration,
    pub reclaim_count: usize,
    pub dedup_expected_items: u64,
    pub dedup_fp_rate: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_idle: Duration::from_secs(60),
            reclaim_count: 100,
            dedup_expected_items: 1_000_000,
            dedup_fp_rate: 0.001,
        }
    }
}

/// Outcome of a (batch) enqueue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    pub total: usize,
    pub enqueued: usize,
    pub duplicate: usize,
    pub msg_ids: Vec<String>,
}

/// Point-in-time queue statistics for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub high: u64,
    pub normal: u64,
    pub low: u64,
    pub dead_letter: u64,
    pub deduped: u64,
}

pub struct CrawlQueueService {
    backend: Arc<dyn QueueBackend>,
    dedup: DedupFilters,
    config: QueueConfig,
}

impl CrawlQueueService {
    pub fn new(backend: Arc<dyn QueueBackend>, config: QueueConfig) -> Self {
        let dedup = DedupFilters::new(config.dedup_expected_items, config.dedup_fp_rate);
        Self { backend, dedup, config }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub async fn ensure_queues(&self, project_id: &str) -> Result<(), MasterError> {
        self.backend.ensure_queues(project_id).await
    }

    /// Enqueue URLs with optional dedup.
    ///
    /// `skip_dedup` is used for seed injection: seeds always enter the
    /// queue, and are recorded in the filter so later discoveries of
    /// the same URL are dropped.
    pub async fn enqueue_urls(
        &self,
        project_id: &str,
        tasks: Vec<CrawlTask>,
        priority: Priority,
        skip_dedup: bool,
    ) -> Result<EnqueueReport, MasterError> {
        let total = tasks.len();
        let mut fresh = Vec::with_capacity(total);
        let mut duplicate = 0;
        for task in tasks {
            let new = self.dedup.check_and_add(project_id, &task.url);
            if new || skip_dedup {
                fresh.push(task);
            } else {
                duplicate += 1;
            }
        }

        let msg_ids = if fresh.is_empty() {
            Vec::new()
        } else {
            self.backend.enqueue(project_id, &fresh, priority).await?
        };
        debug!(
            project_id,
            total,
            enqueued = fresh.len(),
            duplicate,
            priority = %priority,
            "enqueued crawl tasks"
        );
        Ok(EnqueueReport { total, enqueued: fresh.len(), duplicate, msg_ids })
    }

    pub async fn enqueue_url(
        &self,
        project_id: &str,
        task: CrawlTask,
        priority: Priority,
    ) -> Result<EnqueueReport, MasterError> {
        self.enqueue_urls(project_id, vec![task], priority, false).await
    }

    /// Strict-priority fetch. The delivered task advances to Dispatched.
    pub async fn fetch(
        &self,
        project_id: &str,
        timeout: Duration,
    ) -> Result<Option<QueueDelivery>, MasterError> {
        let mut delivery = self.backend.dequeue(project_id, timeout).await?;
        if let Some(delivery) = delivery.as_mut() {
            advance_status(&mut delivery.task, CrawlTaskStatus::Dispatched)?;
        }
        Ok(delivery)
    }

    pub async fn ack(&self, project_id: &str, receipt: &str) -> Result<bool, MasterError> {
        self.backend.ack(project_id, receipt).await
    }

    /// Recoverable failure: bump the retry counter and re-enqueue at the
    /// original priority, or dead-letter once the budget is spent.
    /// Returns `true` if the task was re-enqueued.
    pub async fn retry(
        &self,
        project_id: &str,
        delivery: &QueueDelivery,
        reason: &str,
    ) -> Result<bool, MasterError> {
        let mut failed = delivery.task.clone();
        // A retry only makes sense for a task that actually ran (or
        // timed out); enforce the status machine on the way through.
        if failed.status == CrawlTaskStatus::Dispatched {
            advance_status(&mut failed, CrawlTaskStatus::Running)?;
        }
        let retried = failed.with_retry();
        let requeued = if retried.retry_count > self.config.max_retries {
            self.backend
                .move_to_dead_letter(project_id, std::slice::from_ref(&retried), reason)
                .await?;
            info!(
                project_id,
                url = %retried.url,
                retry_count = retried.retry_count,
                "retry budget spent, dead-lettered"
            );
            false
        } else {
            self.backend.enqueue(project_id, std::slice::from_ref(&retried), delivery.priority).await?;
            true
        };
        self.backend.ack(project_id, &delivery.receipt).await?;
        Ok(requeued)
    }

    /// One reclaim sweep: re-delivered entries past the retry budget
    /// move to the dead-letter stream; the rest are returned for
    /// dispatch. Dead-letter boundary is `delivery_count > max_retries`.
    pub async fn reclaim_once(
        &self,
        project_id: &str,
    ) -> Result<Vec<QueueDelivery>, MasterError> {
        let reclaimed = self
            .backend
            .reclaim(project_id, self.config.min_idle, self.config.reclaim_count)
            .await?;
        let mut live = Vec::new();
        for mut delivery in reclaimed {
            if delivery.delivery_count > self.config.max_retries as u64 {
                self.backend
                    .move_to_dead_letter(
                        project_id,
                        std::slice::from_ref(&delivery.task),
                        "delivery budget exceeded",
                    )
                    .await?;
                self.backend.ack(project_id, &delivery.receipt).await?;
            } else {
                // A reclaimed entry is being re-dispatched.
                if delivery.task.status.can_transition(CrawlTaskStatus::Dispatched) {
                    delivery.task.status = CrawlTaskStatus::Dispatched;
                }
                live.push(delivery);
            }
        }
        Ok(live)
    }

    /// Run reclaim sweeps for a project until cancelled.
    pub async fn run_reclaimer(
        self: Arc<Self>,
        project_id: String,
        interval: Duration,
        cancel: tokio_util::sync::CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            match self.reclaim_once(&project_id).await {
                Ok(live) if !live.is_empty() => {
                    info!(project_id = %project_id, reclaimed = live.len(), "reclaimed crawl tasks");
                }
                Ok(_) => {}
                Err(e) => warn!(project_id = %project_id, error = %e, "crawl reclaim failed"),
            }
        }
    }

    pub async fn stats(&self, project_id: &str) -> Result<QueueStats, MasterError> {
        Ok(QueueStats {
            high: self.backend.queue_len(project_id, Some(Priority::High)).await?,
            normal: self.backend.queue_len(project_id, Some(Priority::Normal)).await?,
            low: self.backend.queue_len(project_id, Some(Priority::Low)).await?,
            dead_letter: self.backend.dead_letter_len(project_id).await?,
            deduped: self.dedup.inserted(project_id),
        })
    }

    /// Drop queue contents and the dedup filter (batch purge).
    pub async fn purge(&self, project_id: &str) -> Result<(), MasterError> {
        self.backend.purge(project_id).await?;
        self.dedup.clear(project_id);
        Ok(())
    }
}

/// Advance a crawl task through its status machine; transitions outside
/// the table are an error and leave the task unchanged.
pub fn advance_status(task: &mut CrawlTask, to: CrawlTaskStatus) -> Result<(), MasterError> {
    if !task.status.can_transition(to) {
        return Err(MasterError::InvalidCrawlTransition { from: task.status, to });
    }
    task.status = to;
    Ok(())
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

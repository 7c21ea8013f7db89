// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Master dispatcher: worker selection and batch task dispatch.
//!
//! Selection is load-scored; lower is better. Workers over the hard
//! resource limits are rejected outright. Dispatch groups tasks by
//! project, syncs artifact metadata once per project, and pushes each
//! task onto the chosen worker's ready stream.

use crate::registry::Registry;
use crate::MasterError;
use hive_core::{Task, WorkerId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What the scorer sees of one worker.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub worker_id: WorkerId,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub running: u32,
    pub queued: u32,
    pub max_concurrent: u32,
    /// Recent round-trip latency to the worker, milliseconds.
    pub latency_ms: f64,
    /// 0–100.
    pub success_rate: f64,
    pub region: String,
    pub capabilities: Vec<String>,
}

impl WorkerSnapshot {
    /// Hard rejection rules applied before scoring.
    pub fn is_eligible(&self) -> bool {
        self.cpu_percent < 90.0
            && self.memory_percent < 90.0
            && (self.running as f64) < 0.8 * self.max_concurrent as f64
    }

    /// Composite load score; lower is better.
    ///
    /// `0.30·cpu + 0.25·mem + 0.20·task_load + 0.15·latency +
    /// 0.10·(100 − success_rate)` with `task_load` the queue fullness
    /// percentage and `latency` on a log scale (10ms → 0, ~100ms → 25).
    pub fn score(&self) -> f64 {
        let task_load = (((self.running + self.queued) as f64
            / self.max_concurrent.max(1) as f64)
            * 100.0)
            .min(100.0);
        let latency_score = if self.latency_ms <= 10.0 {
            0.0
        } else {
            (25.0 * (self.latency_ms / 10.0).log10()).clamp(0.0, 100.0)
        };
        0.30 * self.cpu_percent
            + 0.25 * self.memory_percent
            + 0.20 * task_load
            + 0.15 * latency_score
            + 0.10 * (100.0 - self.success_rate)
    }
}

/// Artifact metadata returned by the project sync collaborator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArtifactMeta {
    pub file_hash: String,
    pub download_url: String,
    pub entry_point: String,
    pub is_compressed: bool,
}

/// Project artifact sync (HTTP collaborator; external to this crate).
#[async_trait::async_trait]
pub trait ArtifactSync: Send + Sync {
    async fn artifact_meta(&self, project_id: &str) -> Result<ArtifactMeta, MasterError>;
}

/// Destination for dispatched tasks (a worker's ready stream).
#[async_trait::async_trait]
pub trait ReadyStreamSink: Send + Sync {
    /// Push one task; returns the backend message id.
    async fn push(&self, worker_id: &WorkerId, task: &Task) -> Result<String, MasterError>;
}

/// Outcome of one batch dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub per_worker: HashMap<WorkerId, usize>,
}

/// Selection filters for one dispatch round.
#[derive(Debug, Clone, Default)]
pub struct SelectionFilter {
    pub region: Option<String>,
    pub required_capability: Option<String>,
}

pub struct Dispatcher {
    registry: Arc<dyn Registry>,
    artifacts: Arc<dyn ArtifactSync>,
    sink: Arc<dyn ReadyStreamSink>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn Registry>,
        artifacts: Arc<dyn ArtifactSync>,
        sink: Arc<dyn ReadyStreamSink>,
    ) -> Self {
        Self { registry, artifacts, sink }
    }

    /// Pick the least-loaded eligible worker. Ties break on worker id
    /// so repeated calls with equal scores are deterministic.
    pub fn select_worker<'a>(
        candidates: &'a [WorkerSnapshot],
        filter: &SelectionFilter,
    ) -> Option<&'a WorkerSnapshot> {
        candidates
            .iter()
            .filter(|w| w.is_eligible())
            .filter(|w| {
                filter.region.as_ref().map(|r| w.region == *r).unwrap_or(true)
            })
            .filter(|w| {
                filter
                    .required_capability
                    .as_ref()
                    .map(|c| w.capabilities.iter().any(|have| have == c))
                    .unwrap_or(true)
            })
            .min_by(|a, b| {
                (a.score(), a.worker_id.as_str())
                    .partial_cmp(&(b.score(), b.worker_id.as_str()))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Dispatch a set of tasks to one worker: group by project, sync
    /// artifact metadata once per project, merge it into each task,
    /// then push to the worker's ready stream.
    pub async fn dispatch_batch(
        &self,
        worker_id: &WorkerId,
        tasks: Vec<Task>,
    ) -> Result<DispatchReport, MasterError> {
        // Confirm the worker is still known and online.
        let info = self
            .registry
            .get(worker_id)
            .await?
            .ok_or_else(|| MasterError::WorkerNotFound(worker_id.to_string()))?;
        if info.status != hive_core::WorkerStatus::Online {
            return Err(MasterError::WorkerNotFound(worker_id.to_string()));
        }

        let mut by_project: HashMap<String, Vec<Task>> = HashMap::new();
        for task in tasks {
            by_project.entry(task.project_id.clone()).or_default().push(task);
        }

        let mut report = DispatchReport::default();
        for (project_id, group) in by_project {
            let meta = self.artifacts.artifact_meta(&project_id).await?;
            debug!(project_id, file_hash = %meta.file_hash, "synced artifact metadata");
            for mut task in group {
                task.download_url = meta.download_url.clone();
                task.file_hash = meta.file_hash.clone();
                task.is_compressed = meta.is_compressed;
                if task.entry_point.is_empty() {
                    task.entry_point = meta.entry_point.clone();
                }
                self.sink.push(worker_id, &task).await?;
                report.dispatched += 1;
                *report.per_worker.entry(worker_id.clone()).or_default() += 1;
            }
        }
        info!(worker_id = %worker_id, dispatched = report.dispatched, "dispatched batch");
        Ok(report)
    }
}

// ── Redis ready-stream sink ─────────────────────────────────────────────

/// Pushes tasks onto `{ns}:task:ready:{worker_id}` in the Direct-mode
/// wire format.
pub struct RedisReadySink {
    conn: redis::aio::ConnectionManager,
    namespace: String,
}

impl RedisReadySink {
    pub fn new(conn: redis::aio::ConnectionManager, namespace: impl Into<String>) -> Self {
        Self { conn, namespace: namespace.into() }
    }
}

#[async_trait::async_trait]
impl ReadyStreamSink for RedisReadySink {
    async fn push(&self, worker_id: &WorkerId, task: &Task) -> Result<String, MasterError> {
        let fields = hive_transport::wire::encode_task(task)?;
        let key = format!("{}:task:ready:{}", self.namespace, worker_id);
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&key).arg("*");
        for (k, v) in &fields {
            cmd.arg(k).arg(v);
        }
        Ok(cmd.query_async::<String>(&mut conn).await?)
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;

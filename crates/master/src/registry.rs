// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registry with heartbeat-driven offline detection.
//!
//! One record per worker plus a TTL'd liveness key. The sweeper marks
//! workers offline when the key lapses or the last heartbeat ages past
//! the threshold, and evicts workers offline longer than
//! `max_offline_time`.

use crate::MasterError;
use hive_core::{Heartbeat, WorkerId, WorkerInfo, WorkerStatus};
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

/// Registry tuning.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// TTL on the liveness key; ≥ 3× the nominal heartbeat interval.
    pub heartbeat_ttl: Duration,
    /// Heartbeat age past which a worker is marked offline.
    pub offline_threshold: Duration,
    /// Offline age past which a worker is evicted entirely.
    pub max_offline_time: Duration,
    /// Sweeper period.
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_ttl: Duration::from_secs(90),
            offline_threshold: Duration::from_secs(90),
            max_offline_time: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Register (or re-register, idempotently) a worker.
    async fn register(&self, info: WorkerInfo) -> Result<(), MasterError>;

    /// Apply a heartbeat: upsert the record, refresh liveness.
    async fn heartbeat(&self, heartbeat: &Heartbeat, now_ms: u64) -> Result<(), MasterError>;

    async fn get(&self, worker_id: &WorkerId) -> Result<Option<WorkerInfo>, MasterError>;

    async fn list(&self) -> Result<Vec<WorkerInfo>, MasterError>;

    async fn online(&self) -> Result<Vec<WorkerInfo>, MasterError>;

    /// Workers pinned to a batch.
    async fn batch_members(&self, batch_id: &str) -> Result<Vec<WorkerId>, MasterError>;

    /// One sweep: mark stale workers offline, evict the long-dead.
    /// Returns `(marked_offline, evicted)`.
    async fn sweep(&self, now_ms: u64) -> Result<(usize, usize), MasterError>;

    async fn remove(&self, worker_id: &WorkerId) -> Result<bool, MasterError>;
}

// ── In-memory implementation ────────────────────────────────────────────

struct MemoryEntry {
    info: WorkerInfo,
    /// Emulates the TTL'd liveness key: expiry in epoch ms.
    liveness_expires_ms: u64,
    /// When the worker was first seen offline (for eviction).
    offline_since_ms: Option<u64>,
}

/// Single-master registry without external storage.
pub struct MemoryRegistry {
    config: RegistryConfig,
    workers: Mutex<HashMap<WorkerId, MemoryEntry>>,
    batches: Mutex<HashMap<String, HashSet<WorkerId>>>,
}

impl MemoryRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self { config, workers: Mutex::new(HashMap::new()), batches: Mutex::new(HashMap::new()) }
    }

    fn link_batch(&self, worker_id: &WorkerId, batch_id: Option<&String>) {
        let mut batches = self.batches.lock();
        for members in batches.values_mut() {
            members.remove(worker_id);
        }
        if let Some(batch_id) = batch_id {
            batches.entry(batch_id.clone()).or_default().insert(worker_id.clone());
        }
    }
}

#[async_trait::async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, info: WorkerInfo) -> Result<(), MasterError> {
        let expires = info.last_heartbeat_ms + self.config.heartbeat_ttl.as_millis() as u64;
        self.link_batch(&info.worker_id, info.batch_id.as_ref());
        self.workers.lock().insert(
            info.worker_id.clone(),
            MemoryEntry { info, liveness_expires_ms: expires, offline_since_ms: None },
        );
        Ok(())
    }

    async fn heartbeat(&self, heartbeat: &Heartbeat, now_ms: u64) -> Result<(), MasterError> {
        let mut workers = self.workers.lock();
        let entry = workers.entry(heartbeat.worker_id.clone()).or_insert_with(|| MemoryEntry {
            info: WorkerInfo::new(heartbeat.worker_id.clone(), now_ms),
            liveness_expires_ms: 0,
            offline_since_ms: None,
        });
        // Last-writer-wins by timestamp: ignore stale replays.
        if heartbeat.ts_ms < entry.info.last_heartbeat_ms {
            return Ok(());
        }
        entry.info.status = WorkerStatus::Online;
        entry.info.last_heartbeat_ms = heartbeat.ts_ms;
        entry.info.active_tasks = heartbeat.metrics.running_tasks;
        entry.liveness_expires_ms = now_ms + self.config.heartbeat_ttl.as_millis() as u64;
        entry.offline_since_ms = None;
        Ok(())
    }

    async fn get(&self, worker_id: &WorkerId) -> Result<Option<WorkerInfo>, MasterError> {
        Ok(self.workers.lock().get(worker_id).map(|e| e.info.clone()))
    }

    async fn list(&self) -> Result<Vec<WorkerInfo>, MasterError> {
        Ok(self.workers.lock().values().map(|e| e.info.clone()).collect())
    }

    async fn online(&self) -> Result<Vec<WorkerInfo>, MasterError> {
        Ok(self
            .workers
            .lock()
            .values()
            .filter(|e| e.info.status == WorkerStatus::Online)
            .map(|e| e.info.clone())
            .collect())
    }

    async fn batch_members(&self, batch_id: &str) -> Result<Vec<WorkerId>, MasterError> {
        Ok(self
            .batches
            .lock()
            .get(batch_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sweep(&self, now_ms: u64) -> Result<(usize, usize), MasterError> {
        let mut marked = 0;
        let mut evicted = 0;
        let mut to_evict = Vec::new();
        {
            let mut workers = self.workers.lock();
            for (worker_id, entry) in workers.iter_mut() {
                let stale = now_ms >= entry.liveness_expires_ms
                    || now_ms.saturating_sub(entry.info.last_heartbeat_ms)
                        > self.config.offline_threshold.as_millis() as u64;
                if stale && entry.info.status == WorkerStatus::Online {
                    entry.info.status = WorkerStatus::Offline;
                    entry.offline_since_ms = Some(now_ms);
                    marked += 1;
                    debug!(worker_id = %worker_id, "marked worker offline");
                }
                if entry.info.status == WorkerStatus::Offline {
                    let since = entry.offline_since_ms.unwrap_or(now_ms);
                    if now_ms.saturating_sub(since) >= self.config.max_offline_time.as_millis() as u64
                    {
                        to_evict.push(worker_id.clone());
                    }
                }
            }
            for worker_id in &to_evict {
                workers.remove(worker_id);
                evicted += 1;
                info!(worker_id = %worker_id, "evicted long-offline worker");
            }
        }
        for worker_id in &to_evict {
            self.link_batch(worker_id, None);
        }
        Ok((marked, evicted))
    }

    async fn remove(&self, worker_id: &WorkerId) -> Result<bool, MasterError> {
        self.link_batch(worker_id, None);
        Ok(self.workers.lock().remove(worker_id).is_some())
    }
}

// ── Redis implementation ────────────────────────────────────────────────

/// Hash-backed registry shared between master instances.
///
/// Records live in `{ns}:worker:registry` (field per worker id); each
/// worker also gets `{ns}:worker:alive:{id}` with the heartbeat TTL;
/// batch membership is a set `{ns}:worker:batch:{batch_id}`.
pub struct RedisRegistry {
    conn: ConnectionManager,
    namespace: String,
    config: RegistryConfig,
}

impl RedisRegistry {
    pub fn new(conn: ConnectionManager, namespace: impl Into<String>, config: RegistryConfig) -> Self {
        Self { conn, namespace: namespace.into(), config }
    }

    fn registry_key(&self) -> String {
        format!("{}:worker:registry", self.namespace)
    }

    fn alive_key(&self, worker_id: &WorkerId) -> String {
        format!("{}:worker:alive:{}", self.namespace, worker_id)
    }

    fn batch_key(&self, batch_id: &str) -> String {
        format!("{}:worker:batch:{}", self.namespace, batch_id)
    }

    async fn write_info(&self, info: &WorkerInfo) -> Result<(), MasterError> {
        let mut conn = self.conn.clone();
        redis::cmd("HSET")
            .arg(self.registry_key())
            .arg(info.worker_id.as_str())
            .arg(serde_json::to_string(info)?)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn refresh_alive(&self, worker_id: &WorkerId) -> Result<(), MasterError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.alive_key(worker_id))
            .arg("1")
            .arg("EX")
            .arg(self.config.heartbeat_ttl.as_secs())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Registry for RedisRegistry {
    async fn register(&self, info: WorkerInfo) -> Result<(), MasterError> {
        self.write_info(&info).await?;
        self.refresh_alive(&info.worker_id).await?;
        if let Some(batch_id) = &info.batch_id {
            let mut conn = self.conn.clone();
            redis::cmd("SADD")
                .arg(self.batch_key(batch_id))
                .arg(info.worker_id.as_str())
                .query_async::<()>(&mut conn)
                .await?;
        }
        Ok(())
    }

    async fn heartbeat(&self, heartbeat: &Heartbeat, now_ms: u64) -> Result<(), MasterError> {
        let mut info = self
            .get(&heartbeat.worker_id)
            .await?
            .unwrap_or_else(|| WorkerInfo::new(heartbeat.worker_id.clone(), now_ms));
        if heartbeat.ts_ms < info.last_heartbeat_ms {
            return Ok(());
        }
        info.status = WorkerStatus::Online;
        info.last_heartbeat_ms = heartbeat.ts_ms;
        info.active_tasks = heartbeat.metrics.running_tasks;
        self.write_info(&info).await?;
        self.refresh_alive(&heartbeat.worker_id).await
    }

    async fn get(&self, worker_id: &WorkerId) -> Result<Option<WorkerInfo>, MasterError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(self.registry_key())
            .arg(worker_id.as_str())
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<WorkerInfo>, MasterError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> =
            redis::cmd("HGETALL").arg(self.registry_key()).query_async(&mut conn).await?;
        let mut infos = Vec::with_capacity(raw.len());
        for json in raw.values() {
            infos.push(serde_json::from_str(json)?);
        }
        Ok(infos)
    }

    async fn online(&self) -> Result<Vec<WorkerInfo>, MasterError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|info| info.status == WorkerStatus::Online)
            .collect())
    }

    async fn batch_members(&self, batch_id: &str) -> Result<Vec<WorkerId>, MasterError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> =
            redis::cmd("SMEMBERS").arg(self.batch_key(batch_id)).query_async(&mut conn).await?;
        Ok(members.into_iter().map(WorkerId::new).collect())
    }

    async fn sweep(&self, now_ms: u64) -> Result<(usize, usize), MasterError> {
        let mut marked = 0;
        let mut evicted = 0;
        for mut info in self.list().await? {
            let mut conn = self.conn.clone();
            let alive: bool = redis::cmd("EXISTS")
                .arg(self.alive_key(&info.worker_id))
                .query_async::<u64>(&mut conn)
                .await?
                > 0;
            let heartbeat_age = now_ms.saturating_sub(info.last_heartbeat_ms);
            let stale = !alive || heartbeat_age > self.config.offline_threshold.as_millis() as u64;

            if stale && info.status == WorkerStatus::Online {
                info.status = WorkerStatus::Offline;
                self.write_info(&info).await?;
                marked += 1;
            }
            if info.status == WorkerStatus::Offline
                && heartbeat_age >= self.config.max_offline_time.as_millis() as u64
            {
                self.remove(&info.worker_id).await?;
                evicted += 1;
            }
        }
        Ok((marked, evicted))
    }

    async fn remove(&self, worker_id: &WorkerId) -> Result<bool, MasterError> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("HDEL")
            .arg(self.registry_key())
            .arg(worker_id.as_str())
            .query_async(&mut conn)
            .await?;
        redis::cmd("DEL")
            .arg(self.alive_key(worker_id))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}

/// Run the sweeper until cancelled.
pub async fn run_sweeper(
    registry: std::sync::Arc<dyn Registry>,
    config: RegistryConfig,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.cleanup_interval) => {}
        }
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        match registry.sweep(now_ms).await {
            Ok((0, 0)) => {}
            Ok((marked, evicted)) => {
                info!(marked, evicted, "registry sweep finished");
            }
            Err(e) => tracing::warn!(error = %e, "registry sweep failed"),
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

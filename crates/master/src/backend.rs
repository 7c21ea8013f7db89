// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable crawl-queue backends.
//!
//! `memory` keeps everything in-process (single master); `redis` uses
//! shared Streams so multiple master instances coordinate. The backend
//! is chosen at process start and never switched live.

use crate::MasterError;
use hive_core::{CrawlTask, Priority};
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::debug;

/// One delivered crawl task plus its transport bookkeeping.
#[derive(Debug, Clone)]
pub struct QueueDelivery {
    pub task: CrawlTask,
    /// Backend-opaque receipt for ack.
    pub receipt: String,
    /// Times this entry has been delivered (1 on first delivery).
    pub delivery_count: u64,
    pub priority: Priority,
}

#[async_trait::async_trait]
pub trait QueueBackend: Send + Sync {
    /// Create the priority + dead-letter structures for a project.
    async fn ensure_queues(&self, project_id: &str) -> Result<(), MasterError>;

    /// Enqueue tasks at a priority; returns backend message ids.
    async fn enqueue(
        &self,
        project_id: &str,
        tasks: &[CrawlTask],
        priority: Priority,
    ) -> Result<Vec<String>, MasterError>;

    /// Strict-priority dequeue: HIGH, then NORMAL, then LOW; blocks up
    /// to `timeout` across all three.
    async fn dequeue(
        &self,
        project_id: &str,
        timeout: Duration,
    ) -> Result<Option<QueueDelivery>, MasterError>;

    async fn ack(&self, project_id: &str, receipt: &str) -> Result<bool, MasterError>;

    async fn move_to_dead_letter(
        &self,
        project_id: &str,
        tasks: &[CrawlTask],
        reason: &str,
    ) -> Result<(), MasterError>;

    /// Reclaim deliveries idle past `min_idle`; delivery_count reflects
    /// the re-delivery.
    async fn reclaim(
        &self,
        project_id: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<QueueDelivery>, MasterError>;

    async fn queue_len(
        &self,
        project_id: &str,
        priority: Option<Priority>,
    ) -> Result<u64, MasterError>;

    async fn dead_letter_len(&self, project_id: &str) -> Result<u64, MasterError>;

    /// Drop all queue state for a project (batch purge).
    async fn purge(&self, project_id: &str) -> Result<(), MasterError>;
}

// ── Memory backend ──────────────────────────────────────────────────────

#[derive(Default)]
struct ProjectQueues {
    ready: HashMap<Priority, VecDeque<(String, CrawlTask)>>,
    /// receipt → (task, priority, delivered_at, delivery_count)
    pending: HashMap<String, (CrawlTask, Priority, Instant, u64)>,
    dead: Vec<(CrawlTask, String)>,
    next_id: u64,
}

/// In-process backend for a single-master deployment.
#[derive(Default)]
pub struct MemoryBackend {
    projects: Mutex<HashMap<String, ProjectQueues>>,
    notify: Notify,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn pop_ready(&self, project_id: &str) -> Option<QueueDelivery> {
        let mut projects = self.projects.lock();
        let queues = projects.get_mut(project_id)?;
        for priority in Priority::ORDERED {
            if let Some((msg_id, task)) = queues.ready.get_mut(&priority).and_then(VecDeque::pop_front)
            {
                let receipt = format!("{}|{}", priority.as_wire_str(), msg_id);
                let count = queues
                    .pending
                    .get(&receipt)
                    .map(|(_, _, _, c)| c + 1)
                    .unwrap_or(1);
                queues
                    .pending
                    .insert(receipt.clone(), (task.clone(), priority, Instant::now(), count));
                return Some(QueueDelivery { task, receipt, delivery_count: count, priority });
            }
        }
        None
    }
}

#[async_trait::async_trait]
impl QueueBackend for MemoryBackend {
    async fn ensure_queues(&self, project_id: &str) -> Result<(), MasterError> {
        let mut projects = self.projects.lock();
        let queues = projects.entry(project_id.to_string()).or_default();
        for priority in Priority::ORDERED {
            queues.ready.entry(priority).or_default();
        }
        Ok(())
    }

    async fn enqueue(
        &self,
        project_id: &str,
        tasks: &[CrawlTask],
        priority: Priority,
    ) -> Result<Vec<String>, MasterError> {
        let mut ids = Vec::with_capacity(tasks.len());
        {
            let mut projects = self.projects.lock();
            let queues = projects.entry(project_id.to_string()).or_default();
            for task in tasks {
                queues.next_id += 1;
                let msg_id = format!("{}-0", queues.next_id);
                queues.ready.entry(priority).or_default().push_back((msg_id.clone(), task.clone()));
                ids.push(msg_id);
            }
        }
        self.notify.notify_waiters();
        Ok(ids)
    }

    async fn dequeue(
        &self,
        project_id: &str,
        timeout: Duration,
    ) -> Result<Option<QueueDelivery>, MasterError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(delivery) = self.pop_ready(project_id) {
                return Ok(Some(delivery));
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    async fn ack(&self, project_id: &str, receipt: &str) -> Result<bool, MasterError> {
        let mut projects = self.projects.lock();
        Ok(projects
            .get_mut(project_id)
            .map(|q| q.pending.remove(receipt).is_some())
            .unwrap_or(false))
    }

    async fn move_to_dead_letter(
        &self,
        project_id: &str,
        tasks: &[CrawlTask],
        reason: &str,
    ) -> Result<(), MasterError> {
        let mut projects = self.projects.lock();
        let queues = projects.entry(project_id.to_string()).or_default();
        for task in tasks {
            queues.dead.push((task.clone(), reason.to_string()));
        }
        Ok(())
    }

    async fn reclaim(
        &self,
        project_id: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<QueueDelivery>, MasterError> {
        let mut projects = self.projects.lock();
        let Some(queues) = projects.get_mut(project_id) else { return Ok(Vec::new()) };
        let now = Instant::now();
        let mut reclaimed = Vec::new();
        for (receipt, (task, priority, delivered_at, delivery_count)) in
            queues.pending.iter_mut()
        {
            if reclaimed.len() >= count {
                break;
            }
            if now.duration_since(*delivered_at) >= min_idle {
                *delivered_at = now;
                *delivery_count += 1;
                reclaimed.push(QueueDelivery {
                    task: task.clone(),
                    receipt: receipt.clone(),
                    delivery_count: *delivery_count,
                    priority: *priority,
                });
            }
        }
        Ok(reclaimed)
    }

    async fn queue_len(
        &self,
        project_id: &str,
        priority: Option<Priority>,
    ) -> Result<u64, MasterError> {
        let projects = self.projects.lock();
        let Some(queues) = projects.get(project_id) else { return Ok(0) };
        let len = match priority {
            Some(p) => queues.ready.get(&p).map(VecDeque::len).unwrap_or(0),
            None => queues.ready.values().map(VecDeque::len).sum(),
        };
        Ok(len as u64)
    }

    async fn dead_letter_len(&self, project_id: &str) -> Result<u64, MasterError> {
        let projects = self.projects.lock();
        Ok(projects.get(project_id).map(|q| q.dead.len() as u64).unwrap_or(0))
    }

    async fn purge(&self, project_id: &str) -> Result<(), MasterError> {
        self.projects.lock().remove(project_id);
        Ok(())
    }
}

// ── Redis backend ───────────────────────────────────────────────────────

/// Shared-Streams backend; key layout
/// `{ns}:crawl:{project}:{high|normal|low}` + `{ns}:crawl:{project}:dead`.
pub struct RedisBackend {
    conn: ConnectionManager,
    namespace: String,
    group: String,
    consumer: String,
}

impl RedisBackend {
    pub fn new(conn: ConnectionManager, namespace: impl Into<String>, consumer: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let group = format!("{namespace}:crawl-consumers");
        Self { conn, namespace, group, consumer: consumer.into() }
    }

    fn queue_key(&self, project_id: &str, priority: Priority) -> String {
        format!("{}:crawl:{}:{}", self.namespace, project_id, priority.as_wire_str())
    }

    fn dead_key(&self, project_id: &str) -> String {
        format!("{}:crawl:{}:dead", self.namespace, project_id)
    }

    fn encode(task: &CrawlTask) -> Result<String, MasterError> {
        Ok(serde_json::to_string(task)?)
    }

    fn decode(fields: &HashMap<String, String>) -> Option<CrawlTask> {
        fields.get("task").and_then(|raw| serde_json::from_str(raw).ok())
    }
}

type StreamReadReply = Option<Vec<(String, Vec<(String, HashMap<String, String>)>)>>;

#[async_trait::async_trait]
impl QueueBackend for RedisBackend {
    async fn ensure_queues(&self, project_id: &str) -> Result<(), MasterError> {
        let mut conn = self.conn.clone();
        for priority in Priority::ORDERED {
            let key = self.queue_key(project_id, priority);
            let result = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&key)
                .arg(&self.group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async::<()>(&mut conn)
                .await;
            match result {
                Ok(()) => debug!(key, "created crawl queue"),
                Err(e) if e.to_string().contains("BUSYGROUP") => {}
                Err(e) => return Err(MasterError::Redis(e)),
            }
        }
        Ok(())
    }

    async fn enqueue(
        &self,
        project_id: &str,
        tasks: &[CrawlTask],
        priority: Priority,
    ) -> Result<Vec<String>, MasterError> {
        let mut conn = self.conn.clone();
        let key = self.queue_key(project_id, priority);
        // Batch enqueue in one round trip.
        let mut pipe = redis::pipe();
        for task in tasks {
            pipe.cmd("XADD").arg(&key).arg("*").arg("task").arg(Self::encode(task)?);
        }
        let ids: Vec<String> = pipe.query_async(&mut conn).await?;
        Ok(ids)
    }

    async fn dequeue(
        &self,
        project_id: &str,
        timeout: Duration,
    ) -> Result<Option<QueueDelivery>, MasterError> {
        let mut conn = self.conn.clone();

        // Non-blocking strict-priority pass first.
        for priority in Priority::ORDERED {
            let key = self.queue_key(project_id, priority);
            let reply: StreamReadReply = redis::cmd("XREADGROUP")
                .arg("GROUP")
                .arg(&self.group)
                .arg(&self.consumer)
                .arg("COUNT")
                .arg(1)
                .arg("STREAMS")
                .arg(&key)
                .arg(">")
                .query_async(&mut conn)
                .await?;
            if let Some(delivery) = self.first_delivery(reply, priority) {
                return Ok(Some(delivery));
            }
        }

        // Nothing ready: block across all three until the timeout.
        let keys: Vec<String> =
            Priority::ORDERED.iter().map(|p| self.queue_key(project_id, *p)).collect();
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(timeout.as_millis() as u64)
            .arg("STREAMS");
        for key in &keys {
            cmd.arg(key);
        }
        for _ in &keys {
            cmd.arg(">");
        }
        let reply: StreamReadReply = cmd.query_async(&mut conn).await?;
        let Some(streams) = reply else { return Ok(None) };
        for (stream_key, entries) in streams {
            let priority = Priority::ORDERED
                .into_iter()
                .find(|p| stream_key.ends_with(p.as_wire_str()))
                .unwrap_or(Priority::Normal);
            if let Some((msg_id, fields)) = entries.into_iter().next() {
                if let Some(task) = Self::decode(&fields) {
                    return Ok(Some(QueueDelivery {
                        task,
                        receipt: format!("{stream_key}|{msg_id}"),
                        delivery_count: 1,
                        priority,
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn ack(&self, project_id: &str, receipt: &str) -> Result<bool, MasterError> {
        let _ = project_id;
        let Some((stream_key, msg_id)) = receipt.rsplit_once('|') else { return Ok(false) };
        let mut conn = self.conn.clone();
        let acked: u64 = redis::cmd("XACK")
            .arg(stream_key)
            .arg(&self.group)
            .arg(msg_id)
            .query_async(&mut conn)
            .await?;
        Ok(acked > 0)
    }

    async fn move_to_dead_letter(
        &self,
        project_id: &str,
        tasks: &[CrawlTask],
        reason: &str,
    ) -> Result<(), MasterError> {
        let mut conn = self.conn.clone();
        let key = self.dead_key(project_id);
        let mut pipe = redis::pipe();
        for task in tasks {
            pipe.cmd("XADD")
                .arg(&key)
                .arg("*")
                .arg("task")
                .arg(Self::encode(task)?)
                .arg("reason")
                .arg(reason)
                .arg("dead_lettered_at")
                .arg(chrono::Utc::now().timestamp_millis());
        }
        pipe.query_async::<Vec<String>>(&mut conn).await?;
        Ok(())
    }

    async fn reclaim(
        &self,
        project_id: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<QueueDelivery>, MasterError> {
        let mut conn = self.conn.clone();
        let mut reclaimed = Vec::new();
        for priority in Priority::ORDERED {
            let key = self.queue_key(project_id, priority);

            let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
                .arg(&key)
                .arg(&self.group)
                .arg("-")
                .arg("+")
                .arg(count * 2)
                .query_async(&mut conn)
                .await
                .unwrap_or_default();
            let counts: HashMap<String, u64> =
                pending.into_iter().map(|(id, _, _, n)| (id, n)).collect();

            let reply: redis::Value = redis::cmd("XAUTOCLAIM")
                .arg(&key)
                .arg(&self.group)
                .arg(&self.consumer)
                .arg(min_idle.as_millis() as u64)
                .arg("0-0")
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await?;
            for (msg_id, fields) in autoclaim_entries(reply) {
                if let Some(task) = Self::decode(&fields) {
                    let delivery_count = counts.get(&msg_id).copied().unwrap_or(1) + 1;
                    reclaimed.push(QueueDelivery {
                        task,
                        receipt: format!("{key}|{msg_id}"),
                        delivery_count,
                        priority,
                    });
                }
            }
            if reclaimed.len() >= count {
                break;
            }
        }
        Ok(reclaimed)
    }

    async fn queue_len(
        &self,
        project_id: &str,
        priority: Option<Priority>,
    ) -> Result<u64, MasterError> {
        let mut conn = self.conn.clone();
        let priorities: Vec<Priority> = match priority {
            Some(p) => vec![p],
            None => Priority::ORDERED.to_vec(),
        };
        let mut total = 0u64;
        for p in priorities {
            let len: u64 = redis::cmd("XLEN")
                .arg(self.queue_key(project_id, p))
                .query_async(&mut conn)
                .await?;
            total += len;
        }
        Ok(total)
    }

    async fn dead_letter_len(&self, project_id: &str) -> Result<u64, MasterError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("XLEN").arg(self.dead_key(project_id)).query_async(&mut conn).await?)
    }

    async fn purge(&self, project_id: &str) -> Result<(), MasterError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for priority in Priority::ORDERED {
            pipe.cmd("DEL").arg(self.queue_key(project_id, priority));
        }
        pipe.cmd("DEL").arg(self.dead_key(project_id));
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

impl RedisBackend {
    fn first_delivery(
        &self,
        reply: StreamReadReply,
        priority: Priority,
    ) -> Option<QueueDelivery> {
        let streams = reply?;
        for (stream_key, entries) in streams {
            if let Some((msg_id, fields)) = entries.into_iter().next() {
                if let Some(task) = Self::decode(&fields) {
                    return Some(QueueDelivery {
                        task,
                        receipt: format!("{stream_key}|{msg_id}"),
                        delivery_count: 1,
                        priority,
                    });
                }
            }
        }
        None
    }
}

/// Extract `(msg_id, fields)` pairs from an XAUTOCLAIM reply (entries
/// sit at index 1 on both 6.2 and 7.x shapes).
fn autoclaim_entries(value: redis::Value) -> Vec<(String, HashMap<String, String>)> {
    let redis::Value::Array(items) = value else { return Vec::new() };
    let Some(redis::Value::Array(entries)) = items.into_iter().nth(1) else { return Vec::new() };
    let mut out = Vec::new();
    for entry in entries {
        let redis::Value::Array(pair) = entry else { continue };
        let mut iter = pair.into_iter();
        let (Some(id), Some(fields)) = (iter.next(), iter.next()) else { continue };
        let Some(id) = as_string(id) else { continue };
        let Some(fields) = as_fields(fields) else { continue };
        out.push((id, fields));
    }
    out
}

fn as_string(value: redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        redis::Value::SimpleString(s) => Some(s),
        _ => None,
    }
}

fn as_fields(value: redis::Value) -> Option<HashMap<String, String>> {
    match value {
        redis::Value::Array(items) => {
            let mut map = HashMap::new();
            let mut iter = items.into_iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                map.insert(as_string(k)?, as_string(v)?);
            }
            Some(map)
        }
        redis::Value::Map(pairs) => {
            let mut map = HashMap::new();
            for (k, v) in pairs {
                map.insert(as_string(k)?, as_string(v)?);
            }
            Some(map)
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;

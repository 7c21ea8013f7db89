// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct transport: worker ↔ Redis Streams, no intermediary.
//!
//! Consumer-group semantics give at-least-once delivery: a task stays
//! pending until XACKed, and the reclaim daemon re-assigns entries
//! another consumer left idle. Log entries use explicit stream IDs so
//! replays after reconnect collapse into no-ops.

mod keys;
mod reclaim;

pub use keys::Keys;
pub use reclaim::ReclaimDaemon;

use crate::backoff::PollBackoff;
use crate::receipt::{decode_receipt, encode_receipt};
use crate::wire::{self, FieldMap};
use crate::{Transport, TransportError, TransportMode};
use hive_core::{ControlMessage, Heartbeat, LogEntry, RunId, Task, TaskResult};
use parking_lot::{Mutex, RwLock};
use redis::aio::ConnectionManager;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Direct-mode settings.
#[derive(Debug, Clone)]
pub struct DirectConfig {
    pub redis_url: String,
    pub namespace: String,
    pub worker_id: String,
    /// Approximate cap on per-run log streams (`XADD MAXLEN ~`).
    pub log_maxlen: usize,
    /// Idle threshold before a pending task can be reclaimed.
    pub min_idle: Duration,
    /// Deliveries beyond this dead-letter the task.
    pub max_retries: u64,
    /// Max entries claimed per reclaim sweep.
    pub reclaim_count: usize,
    /// TTL on the heartbeat hash (≥ 3× heartbeat interval).
    pub heartbeat_ttl: Duration,
    /// TTL on the direct-registration proof key.
    pub proof_ttl: Duration,
}

impl DirectConfig {
    pub fn new(redis_url: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            namespace: "hive".into(),
            worker_id: worker_id.into(),
            log_maxlen: 10_000,
            min_idle: Duration::from_secs(30),
            max_retries: 3,
            reclaim_count: 50,
            heartbeat_ttl: Duration::from_secs(90),
            proof_ttl: Duration::from_secs(60),
        }
    }
}

/// XREADGROUP reply: stream → entries of (msg_id, fields).
type ReadReply = Option<Vec<(String, Vec<(String, FieldMap)>)>>;

pub struct DirectTransport {
    config: DirectConfig,
    keys: Keys,
    conn: RwLock<Option<ConnectionManager>>,
    /// Tasks the reclaim daemon claimed for this worker; drained by
    /// `poll_task` ahead of new deliveries.
    reclaimed: Mutex<VecDeque<Task>>,
    poll_backoff: Mutex<PollBackoff>,
}

impl DirectTransport {
    pub fn new(config: DirectConfig) -> Self {
        let keys = Keys::new(config.namespace.clone(), config.worker_id.clone());
        Self {
            config,
            keys,
            conn: RwLock::new(None),
            reclaimed: Mutex::new(VecDeque::new()),
            poll_backoff: Mutex::new(PollBackoff::new()),
        }
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    pub fn config(&self) -> &DirectConfig {
        &self.config
    }

    fn connection(&self) -> Result<ConnectionManager, TransportError> {
        self.conn
            .read()
            .clone()
            .ok_or_else(|| TransportError::Connection("not connected".into()))
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let client = redis::Client::open(self.config.redis_url.as_str())
            .map_err(TransportError::Redis)?;
        let manager = ConnectionManager::new(client).await.map_err(TransportError::Redis)?;
        *self.conn.write() = Some(manager);
        Ok(())
    }

    /// Create consumer groups, tolerating BUSYGROUP on re-run.
    async fn ensure_groups(&self) -> Result<(), TransportError> {
        let mut conn = self.connection()?;
        let groups = [
            (self.keys.ready(), self.keys.workers_group()),
            (self.keys.control(), self.keys.control_group()),
            (self.keys.control_global(), self.keys.control_group()),
        ];
        for (stream, group) in groups {
            let result = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&stream)
                .arg(&group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async::<()>(&mut conn)
                .await;
            match result {
                Ok(()) => debug!(stream, group, "created consumer group"),
                Err(e) if e.to_string().contains("BUSYGROUP") => {}
                Err(e) => return Err(TransportError::Redis(e)),
            }
        }
        Ok(())
    }

    /// Write the short-TTL proof key used by register-direct.
    async fn write_proof_key(&self) -> Result<(), TransportError> {
        let mut conn = self.connection()?;
        redis::cmd("SET")
            .arg(self.keys.direct_proof())
            .arg(chrono::Utc::now().timestamp_millis())
            .arg("EX")
            .arg(self.config.proof_ttl.as_secs())
            .query_async::<()>(&mut conn)
            .await
            .map_err(TransportError::Redis)
    }

    /// Queue a reclaimed task for the next `poll_task`.
    pub(crate) fn push_reclaimed(&self, task: Task) {
        self.reclaimed.lock().push_back(task);
    }

    async fn read_group_one(
        &self,
        streams: &[String],
        group: &str,
        timeout: Duration,
    ) -> Result<Option<(String, String, FieldMap)>, TransportError> {
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(group)
            .arg(self.config.worker_id.as_str())
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(timeout.as_millis() as u64)
            .arg("STREAMS");
        for stream in streams {
            cmd.arg(stream);
        }
        for _ in streams {
            cmd.arg(">");
        }

        let reply: ReadReply = cmd.query_async(&mut conn).await.map_err(TransportError::Redis)?;
        let Some(streams) = reply else { return Ok(None) };
        for (stream_key, entries) in streams {
            if let Some((msg_id, fields)) = entries.into_iter().next() {
                return Ok(Some((stream_key, msg_id, fields)));
            }
        }
        Ok(None)
    }

    /// XADD a log entry with an explicit `(ts_ms, seq)` ID.
    ///
    /// Redis rejects duplicate/out-of-order IDs with a "smaller than the
    /// target stream top item" error; that means the entry is already
    /// stored, so it is treated as success.
    async fn xadd_log(&self, entry: &LogEntry) -> Result<(), TransportError> {
        let mut conn = self.connection()?;
        let fields = wire::encode_log_entry(entry);
        let mut cmd = redis::cmd("XADD");
        cmd.arg(self.keys.log_stream(entry.run_id.as_str()))
            .arg("MAXLEN")
            .arg("~")
            .arg(self.config.log_maxlen)
            .arg(entry.stream_entry_id());
        for (k, v) in &fields {
            cmd.arg(k).arg(v);
        }
        match cmd.query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_id_error(&e) => {
                debug!(run_id = %entry.run_id, seq = entry.seq, "log entry already stored");
                Ok(())
            }
            Err(e) => Err(TransportError::Redis(e)),
        }
    }
}

fn is_duplicate_id_error(e: &redis::RedisError) -> bool {
    let text = e.to_string();
    text.contains("equal or smaller") || text.contains("ID specified in XADD")
}

#[async_trait::async_trait]
impl Transport for DirectTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Direct
    }

    async fn start(&self) -> Result<(), TransportError> {
        self.connect().await?;
        self.ensure_groups().await?;
        self.write_proof_key().await?;
        info!(
            worker_id = %self.config.worker_id,
            namespace = %self.config.namespace,
            "direct transport started"
        );
        Ok(())
    }

    async fn poll_task(&self, timeout: Duration) -> Result<Option<Task>, TransportError> {
        // Reclaimed tasks first: they are already pending on our consumer.
        if let Some(task) = self.reclaimed.lock().pop_front() {
            return Ok(Some(task));
        }

        // Honor poll backoff from consecutive failures.
        let wait = self.poll_backoff.lock().remaining();
        if !wait.is_zero() {
            tokio::time::sleep(wait.min(timeout)).await;
        }

        let ready = self.keys.ready();
        let result = self
            .read_group_one(&[ready.clone()], &self.keys.workers_group(), timeout)
            .await;

        match result {
            Ok(Some((stream_key, msg_id, fields))) => {
                self.poll_backoff.lock().record_success();
                let receipt = encode_receipt(&stream_key, &msg_id);
                let task = wire::decode_task(&fields, receipt)?;
                debug!(task_id = %task.task_id, run_id = %task.run_id, "polled task");
                Ok(Some(task))
            }
            Ok(None) => {
                self.poll_backoff.lock().record_success();
                Ok(None)
            }
            Err(e) => {
                let delay = self.poll_backoff.lock().record_failure();
                warn!(error = %e, backoff = ?delay, "poll failed");
                Err(e)
            }
        }
    }

    async fn ack_task(
        &self,
        receipt: &str,
        accepted: bool,
        reason: &str,
    ) -> Result<bool, TransportError> {
        let (stream_key, msg_id) = decode_receipt(receipt)?;
        let mut conn = self.connection()?;

        if !accepted {
            // Compensating enqueue: re-add the original payload (plus the
            // requeue annotations) before acking the old delivery.
            let entries: Vec<(String, FieldMap)> = redis::cmd("XRANGE")
                .arg(stream_key)
                .arg(msg_id)
                .arg(msg_id)
                .query_async(&mut conn)
                .await
                .map_err(TransportError::Redis)?;
            if let Some((_, mut fields)) = entries.into_iter().next() {
                fields.insert("requeue_reason".into(), reason.to_string());
                fields
                    .insert("requeue_at".into(), chrono::Utc::now().timestamp_millis().to_string());
                let mut cmd = redis::cmd("XADD");
                cmd.arg(stream_key).arg("*");
                for (k, v) in &fields {
                    cmd.arg(k).arg(v);
                }
                cmd.query_async::<String>(&mut conn).await.map_err(TransportError::Redis)?;
            }
        }

        let acked: u64 = redis::cmd("XACK")
            .arg(stream_key)
            .arg(self.keys.workers_group())
            .arg(msg_id)
            .query_async(&mut conn)
            .await
            .map_err(TransportError::Redis)?;
        Ok(acked > 0)
    }

    async fn report_result(&self, result: &TaskResult) -> Result<bool, TransportError> {
        let mut conn = self.connection()?;
        let fields = wire::encode_result(result);
        let mut cmd = redis::cmd("XADD");
        cmd.arg(self.keys.result()).arg("*");
        for (k, v) in &fields {
            cmd.arg(k).arg(v);
        }
        cmd.query_async::<String>(&mut conn).await.map_err(TransportError::Redis)?;
        debug!(run_id = %result.run_id, status = %result.status, "reported result");
        Ok(true)
    }

    async fn send_log_batch(&self, entries: &[LogEntry]) -> Result<(), TransportError> {
        for entry in entries {
            self.xadd_log(entry).await?;
        }
        Ok(())
    }

    async fn send_log_chunk(
        &self,
        run_id: RunId,
        chunk_id: &str,
        index: u32,
        total: u32,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let mut conn = self.connection()?;
        redis::cmd("XADD")
            .arg(self.keys.log_chunk(run_id.as_str()))
            .arg("*")
            .arg("chunk_id")
            .arg(chunk_id)
            .arg("index")
            .arg(index)
            .arg("total")
            .arg(total)
            .arg("data")
            .arg(data)
            .query_async::<String>(&mut conn)
            .await
            .map_err(TransportError::Redis)?;
        Ok(())
    }

    async fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), TransportError> {
        let mut conn = self.connection()?;
        let fields = wire::encode_heartbeat(heartbeat)?;
        let key = self.keys.heartbeat();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(&key);
        for (k, v) in &fields {
            cmd.arg(k).arg(v);
        }
        cmd.query_async::<()>(&mut conn).await.map_err(TransportError::Redis)?;
        redis::cmd("EXPIRE")
            .arg(&key)
            .arg(self.config.heartbeat_ttl.as_secs())
            .query_async::<()>(&mut conn)
            .await
            .map_err(TransportError::Redis)?;
        Ok(())
    }

    async fn poll_control(
        &self,
        timeout: Duration,
    ) -> Result<Option<ControlMessage>, TransportError> {
        let streams = [self.keys.control(), self.keys.control_global()];
        match self.read_group_one(&streams, &self.keys.control_group(), timeout).await? {
            Some((stream_key, msg_id, fields)) => {
                let receipt = encode_receipt(&stream_key, &msg_id);
                Ok(Some(wire::decode_control(&fields, receipt)?))
            }
            None => Ok(None),
        }
    }

    async fn ack_control(&self, receipt: &str) -> Result<(), TransportError> {
        let (stream_key, msg_id) = decode_receipt(receipt)?;
        let mut conn = self.connection()?;
        redis::cmd("XACK")
            .arg(stream_key)
            .arg(self.keys.control_group())
            .arg(msg_id)
            .query_async::<u64>(&mut conn)
            .await
            .map_err(TransportError::Redis)?;
        Ok(())
    }

    async fn report_control_result(
        &self,
        control_id: &str,
        result: &serde_json::Value,
    ) -> Result<(), TransportError> {
        let mut conn = self.connection()?;
        redis::cmd("XADD")
            .arg(self.keys.control_reply())
            .arg("*")
            .arg("control_id")
            .arg(control_id)
            .arg("result")
            .arg(result.to_string())
            .arg("timestamp")
            .arg(chrono::Utc::now().timestamp_millis())
            .query_async::<String>(&mut conn)
            .await
            .map_err(TransportError::Redis)?;
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        info!(worker_id = %self.config.worker_id, "reconnecting direct transport");
        *self.conn.write() = None;
        self.connect().await?;
        self.ensure_groups().await?;
        self.write_proof_key().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        *self.conn.write() = None;
        Ok(())
    }
}

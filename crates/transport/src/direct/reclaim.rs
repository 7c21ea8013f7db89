// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-task reclaim daemon.
//!
//! Periodically XAUTOCLAIMs entries another consumer read but never
//! acked. Reclaimed entries whose delivery count exceeds the retry
//! budget move to the dead-letter stream; the rest are handed to the
//! engine with their `delivery_count` annotated.

use super::DirectTransport;
use crate::receipt::encode_receipt;
use crate::wire::{self, FieldMap};
use crate::TransportError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ReclaimDaemon {
    transport: Arc<DirectTransport>,
    interval: Duration,
}

impl ReclaimDaemon {
    pub fn new(transport: Arc<DirectTransport>, interval: Duration) -> Self {
        Self { transport, interval }
    }

    /// Run sweeps until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            match self.reclaim_once().await {
                Ok(0) => {}
                Ok(n) => info!(reclaimed = n, "reclaimed pending tasks"),
                Err(e) => warn!(error = %e, "reclaim sweep failed"),
            }
        }
    }

    /// One sweep. Returns the number of tasks queued for re-execution.
    pub async fn reclaim_once(&self) -> Result<usize, TransportError> {
        let transport = &self.transport;
        let keys = transport.keys();
        let config = transport.config();
        let mut conn = transport.connection()?;

        // Delivery counts come from XPENDING (times-delivered covers the
        // delivery XAUTOCLAIM is about to perform too, since claiming
        // increments it).
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(keys.ready())
            .arg(keys.workers_group())
            .arg("-")
            .arg("+")
            .arg(config.reclaim_count * 2)
            .query_async(&mut conn)
            .await
            .unwrap_or_default();
        let delivery_counts: HashMap<String, u64> =
            pending.into_iter().map(|(id, _, _, delivered)| (id, delivered)).collect();

        let reply: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(keys.ready())
            .arg(keys.workers_group())
            .arg(keys.worker_id())
            .arg(config.min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(config.reclaim_count)
            .query_async(&mut conn)
            .await
            .map_err(TransportError::Redis)?;

        let claimed = parse_autoclaim_entries(reply);
        if claimed.is_empty() {
            return Ok(0);
        }

        let mut queued = 0;
        for (msg_id, fields) in claimed {
            // Claiming bumped times-delivered past what XPENDING saw.
            let delivery_count = delivery_counts.get(&msg_id).copied().unwrap_or(1) + 1;

            if delivery_count > config.max_retries {
                self.dead_letter(&mut conn, &msg_id, &fields, delivery_count).await?;
                continue;
            }

            let receipt = encode_receipt(&keys.ready(), &msg_id);
            match wire::decode_task(&fields, receipt) {
                Ok(mut task) => {
                    task.params
                        .insert("delivery_count".into(), serde_json::json!(delivery_count));
                    debug!(
                        task_id = %task.task_id,
                        delivery_count,
                        "reclaimed pending task"
                    );
                    transport.push_reclaimed(task);
                    queued += 1;
                }
                Err(e) => {
                    // Undecodable entries would loop forever; dead-letter.
                    warn!(msg_id, error = %e, "dead-lettering undecodable entry");
                    self.dead_letter(&mut conn, &msg_id, &fields, delivery_count).await?;
                }
            }
        }
        Ok(queued)
    }

    /// Move an entry to the dead-letter stream and ack the original.
    async fn dead_letter(
        &self,
        conn: &mut redis::aio::ConnectionManager,
        msg_id: &str,
        fields: &FieldMap,
        delivery_count: u64,
    ) -> Result<(), TransportError> {
        let keys = self.transport.keys();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(keys.dead_letter()).arg("*");
        for (k, v) in fields {
            cmd.arg(k).arg(v);
        }
        cmd.arg("delivery_count").arg(delivery_count);
        cmd.arg("dead_lettered_at").arg(chrono::Utc::now().timestamp_millis());
        cmd.query_async::<String>(conn).await.map_err(TransportError::Redis)?;

        redis::cmd("XACK")
            .arg(keys.ready())
            .arg(keys.workers_group())
            .arg(msg_id)
            .query_async::<u64>(conn)
            .await
            .map_err(TransportError::Redis)?;

        info!(msg_id, delivery_count, "task exceeded retry budget, dead-lettered");
        Ok(())
    }
}

/// Pull `(msg_id, fields)` pairs out of an XAUTOCLAIM reply.
///
/// Redis 6.2 replies `[cursor, entries]`, 7.x `[cursor, entries,
/// deleted]`; both shapes carry the entries at index 1.
fn parse_autoclaim_entries(value: redis::Value) -> Vec<(String, FieldMap)> {
    let redis::Value::Array(items) = value else { return Vec::new() };
    let Some(entries) = items.into_iter().nth(1) else { return Vec::new() };
    let redis::Value::Array(entries) = entries else { return Vec::new() };

    let mut result = Vec::new();
    for entry in entries {
        let redis::Value::Array(pair) = entry else { continue };
        let mut iter = pair.into_iter();
        let (Some(id_value), Some(fields_value)) = (iter.next(), iter.next()) else { continue };
        let Some(msg_id) = value_to_string(id_value) else { continue };
        let Some(fields) = fields_to_map(fields_value) else { continue };
        result.push((msg_id, fields));
    }
    result
}

fn value_to_string(value: redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        redis::Value::SimpleString(s) => Some(s),
        redis::Value::Int(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Field list: flat `[k1, v1, k2, v2, …]` array (RESP2) or a map (RESP3).
fn fields_to_map(value: redis::Value) -> Option<FieldMap> {
    match value {
        redis::Value::Array(items) => {
            let mut map = FieldMap::new();
            let mut iter = items.into_iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                map.insert(value_to_string(k)?, value_to_string(v)?);
            }
            Some(map)
        }
        redis::Value::Map(pairs) => {
            let mut map = FieldMap::new();
            for (k, v) in pairs {
                map.insert(value_to_string(k)?, value_to_string(v)?);
            }
            Some(map)
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "reclaim_tests.rs"]
mod tests;

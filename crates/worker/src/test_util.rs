// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory transport for engine and heartbeat tests.

use hive_core::{ControlMessage, Heartbeat, LogEntry, RunId, Task, TaskResult};
use hive_transport::{Transport, TransportError, TransportMode};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Scriptable transport double: tasks and controls are queued by the
/// test; sends are recorded; failure modes are switchable.
#[derive(Default)]
pub struct FakeTransport {
    pub tasks: Mutex<VecDeque<Task>>,
    pub controls: Mutex<VecDeque<ControlMessage>>,
    pub results: Mutex<Vec<TaskResult>>,
    pub acks: Mutex<Vec<(String, bool, String)>>,
    pub control_acks: Mutex<Vec<String>>,
    pub control_results: Mutex<Vec<(String, serde_json::Value)>>,
    pub logs: Mutex<Vec<LogEntry>>,
    pub heartbeats: Mutex<Vec<Heartbeat>>,
    pub fail_heartbeats: AtomicBool,
    pub reconnects: AtomicU32,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_task(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }

    pub fn queue_control(&self, control: ControlMessage) {
        self.controls.lock().push_back(control);
    }

    pub fn result_statuses(&self) -> Vec<hive_core::TaskStatus> {
        self.results.lock().iter().map(|r| r.status).collect()
    }

    pub fn accepted_acks(&self) -> usize {
        self.acks.lock().iter().filter(|(_, accepted, _)| *accepted).count()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Direct
    }

    async fn start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn poll_task(&self, timeout: Duration) -> Result<Option<Task>, TransportError> {
        if let Some(task) = self.tasks.lock().pop_front() {
            return Ok(Some(task));
        }
        tokio::time::sleep(timeout.min(Duration::from_millis(20))).await;
        Ok(None)
    }

    async fn ack_task(
        &self,
        receipt: &str,
        accepted: bool,
        reason: &str,
    ) -> Result<bool, TransportError> {
        self.acks.lock().push((receipt.to_string(), accepted, reason.to_string()));
        Ok(true)
    }

    async fn report_result(&self, result: &TaskResult) -> Result<bool, TransportError> {
        self.results.lock().push(result.clone());
        Ok(true)
    }

    async fn send_log_batch(&self, entries: &[LogEntry]) -> Result<(), TransportError> {
        self.logs.lock().extend_from_slice(entries);
        Ok(())
    }

    async fn send_log_chunk(
        &self,
        _run_id: RunId,
        _chunk_id: &str,
        _index: u32,
        _total: u32,
        _data: &[u8],
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), TransportError> {
        if self.fail_heartbeats.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("fake outage".into()));
        }
        self.heartbeats.lock().push(heartbeat.clone());
        Ok(())
    }

    async fn poll_control(
        &self,
        timeout: Duration,
    ) -> Result<Option<ControlMessage>, TransportError> {
        if let Some(control) = self.controls.lock().pop_front() {
            return Ok(Some(control));
        }
        tokio::time::sleep(timeout.min(Duration::from_millis(20))).await;
        Ok(None)
    }

    async fn ack_control(&self, receipt: &str) -> Result<(), TransportError> {
        self.control_acks.lock().push(receipt.to_string());
        Ok(())
    }

    async fn report_control_result(
        &self,
        control_id: &str,
        result: &serde_json::Value,
    ) -> Result<(), TransportError> {
        self.control_results.lock().push((control_id.to_string(), result.clone()));
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        self.fail_heartbeats.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

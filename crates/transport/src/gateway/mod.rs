// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway transport: worker ↔ gRPC proxy.
//!
//! One long-lived channel carrying unary RPCs plus an optional bidi
//! stream for server pushes. Auth is either mTLS or API-key metadata
//! (`x-api-key` + `x-worker-id`). A receipt cache makes ack/result
//! RPCs idempotent across reconnects.

mod reconnect;

pub use reconnect::{ConnState, ReconnectManager};

use crate::backoff::Backoff;
use crate::proto;
use crate::proto::gateway_service_client::GatewayServiceClient;
use crate::receipt::{ack_key, result_key, ReceiptCache};
use crate::{Transport, TransportError, TransportMode};
use hive_core::clock::iso8601;
use hive_core::{
    ControlKind, ControlMessage, Heartbeat, LogEntry, ProjectType, RunId, Task, TaskId, TaskResult,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonic::metadata::MetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tonic::Request;
use tracing::{debug, info, warn};

/// Gateway-mode settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `http://host:port` or `https://host:port`.
    pub endpoint: String,
    pub worker_id: String,
    pub api_key: String,
    /// TLS off is permitted for dev setups only.
    pub tls: bool,
    pub ca_cert: Option<PathBuf>,
    /// Client certificate + key for mTLS.
    pub client_identity: Option<(PathBuf, PathBuf)>,
    pub connect_timeout: Duration,
    pub rpc_timeout: Duration,
    /// TTL for the receipt idempotency cache.
    pub receipt_ttl: Duration,
    pub reconnect_backoff: Backoff,
    /// 0 = retry forever.
    pub max_reconnect_attempts: u32,
}

impl GatewayConfig {
    pub fn new(
        endpoint: impl Into<String>,
        worker_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            worker_id: worker_id.into(),
            api_key: api_key.into(),
            tls: false,
            ca_cert: None,
            client_identity: None,
            connect_timeout: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(30),
            receipt_ttl: Duration::from_secs(300),
            reconnect_backoff: Backoff::default(),
            max_reconnect_attempts: 0,
        }
    }
}

pub struct GatewayTransport {
    config: GatewayConfig,
    client: RwLock<Option<GatewayServiceClient<Channel>>>,
    reconnect: ReconnectManager,
    receipts: ReceiptCache,
    /// Controls pushed over the bidi stream, drained ahead of unary polls.
    pushed_controls: Mutex<VecDeque<ControlMessage>>,
    /// Heartbeat interval granted by the server at registration.
    heartbeat_interval_s: AtomicU32,
}

impl GatewayTransport {
    pub fn new(config: GatewayConfig) -> Self {
        let reconnect =
            ReconnectManager::new(config.reconnect_backoff.clone(), config.max_reconnect_attempts);
        let receipts = ReceiptCache::new(config.receipt_ttl);
        Self {
            config,
            client: RwLock::new(None),
            reconnect,
            receipts,
            pushed_controls: Mutex::new(VecDeque::new()),
            heartbeat_interval_s: AtomicU32::new(0),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn conn_state(&self) -> ConnState {
        self.reconnect.state()
    }

    /// Interval the server asked us to heartbeat at (0 until registered).
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.heartbeat_interval_s.load(Ordering::Relaxed) {
            0 => None,
            s => Some(Duration::from_secs(s as u64)),
        }
    }

    fn client(&self) -> Result<GatewayServiceClient<Channel>, TransportError> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| TransportError::Connection("gateway channel not connected".into()))
    }

    /// Wrap a message with auth metadata and the RPC deadline.
    fn request<T>(&self, message: T) -> Result<Request<T>, TransportError> {
        let mut request = Request::new(message);
        request.set_timeout(self.config.rpc_timeout);
        let api_key = MetadataValue::try_from(self.config.api_key.as_str())
            .map_err(|_| TransportError::Auth("api key is not valid metadata".into()))?;
        let worker_id = MetadataValue::try_from(self.config.worker_id.as_str())
            .map_err(|_| TransportError::Auth("worker id is not valid metadata".into()))?;
        request.metadata_mut().insert("x-api-key", api_key);
        request.metadata_mut().insert("x-worker-id", worker_id);
        Ok(request)
    }

    /// Channel-reach preflight + Register handshake.
    async fn connect_and_register(&self) -> Result<(), TransportError> {
        self.reconnect.on_connecting();

        let mut endpoint = Endpoint::from_shared(self.config.endpoint.clone())
            .map_err(|e| TransportError::Connection(e.to_string()))?
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.rpc_timeout);

        if self.config.tls {
            let mut tls = ClientTlsConfig::new();
            if let Some(ca_path) = &self.config.ca_cert {
                let pem = std::fs::read(ca_path)
                    .map_err(|e| TransportError::Connection(format!("read ca cert: {e}")))?;
                tls = tls.ca_certificate(Certificate::from_pem(pem));
            }
            if let Some((cert_path, key_path)) = &self.config.client_identity {
                let cert = std::fs::read(cert_path)
                    .map_err(|e| TransportError::Connection(format!("read client cert: {e}")))?;
                let key = std::fs::read(key_path)
                    .map_err(|e| TransportError::Connection(format!("read client key: {e}")))?;
                tls = tls.identity(Identity::from_pem(cert, key));
            }
            endpoint = endpoint.tls_config(tls)?;
        }

        let channel = endpoint.connect().await?;
        let mut client = GatewayServiceClient::new(channel);

        let register = proto::RegisterRequest {
            worker_id: self.config.worker_id.clone(),
            api_key: self.config.api_key.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: HashMap::new(),
        };
        let response = client.register(self.request(register)?).await?.into_inner();
        if !response.accepted {
            return Err(TransportError::Auth(response.message));
        }
        self.heartbeat_interval_s.store(response.heartbeat_interval_s, Ordering::Relaxed);

        *self.client.write() = Some(client);
        self.reconnect.on_connected();
        info!(
            endpoint = %self.config.endpoint,
            heartbeat_interval_s = response.heartbeat_interval_s,
            "gateway transport registered"
        );
        Ok(())
    }

    /// Open the bidi stream and feed server pushes into the control
    /// queue until cancelled or the stream ends.
    ///
    /// Returns the sender half for outbound [`proto::WorkerMessage`]s
    /// (heartbeat mirroring, streamed results).
    pub async fn open_stream(
        self: &Arc<Self>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<tokio::sync::mpsc::Sender<proto::WorkerMessage>, TransportError> {
        let mut client = self.client()?;
        let (tx, rx) = tokio::sync::mpsc::channel::<proto::WorkerMessage>(64);
        let outbound = tokio_stream::wrappers::ReceiverStream::new(rx);
        let response = client.worker_stream(self.request(outbound)?).await?;
        let mut inbound = response.into_inner();

        let transport = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    message = inbound.message() => match message {
                        Ok(Some(msg)) => transport.handle_push(msg),
                        Ok(None) => {
                            debug!("gateway stream closed by server");
                            break;
                        }
                        Err(status) => {
                            warn!(error = %status, "gateway stream error");
                            break;
                        }
                    }
                }
            }
        });
        Ok(tx)
    }

    fn handle_push(&self, message: proto::MasterMessage) {
        match message.body {
            Some(proto::master_message::Body::Control(control)) => {
                match decode_proto_control(control) {
                    Ok(msg) => self.pushed_controls.lock().push_back(msg),
                    Err(e) => warn!(error = %e, "dropping malformed pushed control"),
                }
            }
            Some(proto::master_message::Body::Task(_)) => {
                // Task delivery over the stream is not part of the worker
                // contract; tasks arrive via PollTask.
                warn!("ignoring task pushed over stream");
            }
            None => {}
        }
    }
}

#[async_trait::async_trait]
impl Transport for GatewayTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Gateway
    }

    async fn start(&self) -> Result<(), TransportError> {
        self.connect_and_register().await
    }

    async fn poll_task(&self, timeout: Duration) -> Result<Option<Task>, TransportError> {
        let mut client = self.client()?;
        let request = proto::PollTaskRequest {
            worker_id: self.config.worker_id.clone(),
            timeout_ms: timeout.as_millis() as u64,
        };
        let mut outer = self.request(request)?;
        // The long-poll must outlive the default RPC deadline.
        outer.set_timeout(timeout + self.config.rpc_timeout);
        let response = client.poll_task(outer).await?.into_inner();
        if !response.has_task {
            return Ok(None);
        }
        let task = response
            .task
            .ok_or_else(|| TransportError::Protocol("has_task without task".into()))?;
        Ok(Some(decode_proto_task(task)?))
    }

    async fn ack_task(
        &self,
        receipt: &str,
        accepted: bool,
        reason: &str,
    ) -> Result<bool, TransportError> {
        let cache_key = ack_key(receipt);
        if let Some(cached) = self.receipts.get(&cache_key) {
            debug!(receipt, "ack already confirmed, returning cached outcome");
            return Ok(cached);
        }
        let mut client = self.client()?;
        let request = proto::AckTaskRequest {
            worker_id: self.config.worker_id.clone(),
            receipt: receipt.to_string(),
            accepted,
            reason: reason.to_string(),
        };
        let response = client.ack_task(self.request(request)?).await?.into_inner();
        self.receipts.put(cache_key, response.ok);
        Ok(response.ok)
    }

    async fn report_result(&self, result: &TaskResult) -> Result<bool, TransportError> {
        let cache_key = result_key(result.task_id.as_str());
        if let Some(cached) = self.receipts.get(&cache_key) {
            debug!(task_id = %result.task_id, "result already reported, returning cached outcome");
            return Ok(cached);
        }
        let mut client = self.client()?;
        let message = encode_proto_result(result);
        let response = client.report_result(self.request(message)?).await?.into_inner();
        self.receipts.put(cache_key, response.ok);
        Ok(response.ok)
    }

    async fn send_log_batch(&self, entries: &[LogEntry]) -> Result<(), TransportError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut client = self.client()?;
        let batch = proto::LogBatch {
            entries: entries.iter().map(encode_proto_log).collect(),
        };
        client.send_log_batch(self.request(batch)?).await?;
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
        let mut client = self.client()?;
        let chunk = proto::LogChunk {
            run_id: run_id.to_string(),
            chunk_id: chunk_id.to_string(),
            index,
            total,
            data: data.to_vec(),
        };
        client.send_log_chunk(self.request(chunk)?).await?;
        Ok(())
    }

    async fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), TransportError> {
        let mut client = self.client()?;
        let message = encode_proto_heartbeat(heartbeat)?;
        let response = client.send_heartbeat(self.request(message)?).await?.into_inner();
        if response.heartbeat_interval_s != 0 {
            self.heartbeat_interval_s.store(response.heartbeat_interval_s, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn poll_control(
        &self,
        timeout: Duration,
    ) -> Result<Option<ControlMessage>, TransportError> {
        if let Some(pushed) = self.pushed_controls.lock().pop_front() {
            return Ok(Some(pushed));
        }
        let mut client = self.client()?;
        let request = proto::PollControlRequest {
            worker_id: self.config.worker_id.clone(),
            timeout_ms: timeout.as_millis() as u64,
        };
        let mut outer = self.request(request)?;
        outer.set_timeout(timeout + self.config.rpc_timeout);
        let response = client.poll_control(outer).await?.into_inner();
        if !response.has_control {
            return Ok(None);
        }
        let control = response
            .control
            .ok_or_else(|| TransportError::Protocol("has_control without control".into()))?;
        Ok(Some(decode_proto_control(control)?))
    }

    async fn ack_control(&self, receipt: &str) -> Result<(), TransportError> {
        let mut client = self.client()?;
        let request = proto::AckControlRequest {
            worker_id: self.config.worker_id.clone(),
            receipt: receipt.to_string(),
        };
        client.ack_control(self.request(request)?).await?;
        Ok(())
    }

    async fn report_control_result(
        &self,
        control_id: &str,
        result: &serde_json::Value,
    ) -> Result<(), TransportError> {
        let mut client = self.client()?;
        let message = proto::ControlResult {
            worker_id: self.config.worker_id.clone(),
            control_id: control_id.to_string(),
            result_json: result.to_string(),
        };
        client.report_control_result(self.request(message)?).await?;
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        *self.client.write() = None;
        loop {
            match self.connect_and_register().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => match self.reconnect.on_failure() {
                    Some(delay) => {
                        warn!(error = %e, ?delay, "gateway reconnect failed, backing off");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!(error = %e, "gateway reconnect attempts exhausted");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        *self.client.write() = None;
        Ok(())
    }
}

// ── proto ↔ core mapping ────────────────────────────────────────────────

fn decode_proto_task(task: proto::TaskMessage) -> Result<Task, TransportError> {
    let project_type = ProjectType::from_wire_str(&task.project_type)
        .ok_or_else(|| TransportError::Protocol(format!("bad project_type {:?}", task.project_type)))?;
    let params = if task.params_json.is_empty() {
        HashMap::new()
    } else {
        serde_json::from_str(&task.params_json)
            .map_err(|e| TransportError::Protocol(format!("bad params: {e}")))?
    };
    let environment = if task.environment_json.is_empty() {
        HashMap::new()
    } else {
        serde_json::from_str(&task.environment_json)
            .map_err(|e| TransportError::Protocol(format!("bad environment: {e}")))?
    };
    Ok(Task {
        task_id: TaskId::from_string(&task.task_id),
        run_id: RunId::from_string(&task.run_id),
        project_id: task.project_id,
        project_type,
        priority: task.priority,
        params,
        environment,
        timeout_s: task.timeout_s,
        download_url: task.download_url,
        file_hash: task.file_hash,
        entry_point: task.entry_point,
        is_compressed: task.is_compressed,
        receipt: task.receipt,
    })
}

fn encode_proto_result(result: &TaskResult) -> proto::ResultMessage {
    proto::ResultMessage {
        run_id: result.run_id.to_string(),
        task_id: result.task_id.to_string(),
        status: result.status.as_wire_str().to_string(),
        exit_code: result.exit_code,
        error_message: result.error_message.clone(),
        started_at: iso8601(result.started_at_ms),
        finished_at: iso8601(result.finished_at_ms),
        duration_ms: result.duration_ms,
        data_json: result.data.as_ref().map(|d| d.to_string()).unwrap_or_default(),
    }
}

fn encode_proto_log(entry: &LogEntry) -> proto::LogMessage {
    proto::LogMessage {
        run_id: entry.run_id.to_string(),
        log_type: entry.stream.as_wire_str().to_string(),
        sequence: entry.seq,
        timestamp: iso8601(entry.ts_ms),
        content: entry.content.clone(),
        level: entry.level.clone().unwrap_or_default(),
    }
}

fn encode_proto_heartbeat(hb: &Heartbeat) -> Result<proto::HeartbeatMessage, TransportError> {
    Ok(proto::HeartbeatMessage {
        worker_id: hb.worker_id.to_string(),
        status: hb.status.clone(),
        cpu_percent: hb.metrics.cpu_percent as f64,
        memory_percent: hb.metrics.memory_percent as f64,
        disk_percent: hb.metrics.disk_percent as f64,
        running_tasks: hb.metrics.running_tasks,
        max_concurrent_tasks: hb.metrics.max_concurrent_tasks,
        timestamp: iso8601(hb.ts_ms),
        name: hb.name.clone(),
        host: hb.host.clone(),
        port: hb.port as u32,
        region: hb.region.clone(),
        version: hb.version.clone(),
        os_type: hb.os_info.os_type.clone(),
        os_version: hb.os_info.os_version.clone(),
        python_version: hb.os_info.python_version.clone(),
        machine_arch: hb.os_info.machine_arch.clone(),
        capabilities_json: serde_json::to_string(&hb.capabilities)
            .map_err(|e| TransportError::Protocol(e.to_string()))?,
    })
}

fn decode_proto_control(control: proto::ControlMessage) -> Result<ControlMessage, TransportError> {
    let kind = ControlKind::from_wire_str(&control.control_type).ok_or_else(|| {
        TransportError::Protocol(format!("bad control_type {:?}", control.control_type))
    })?;
    let payload = if control.payload_json.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str(&control.payload_json)
                .map_err(|e| TransportError::Protocol(format!("bad payload: {e}")))?,
        )
    };
    Ok(ControlMessage {
        kind,
        task_id: none_if_empty(control.task_id),
        run_id: none_if_empty(control.run_id),
        payload,
        receipt: control.receipt,
    })
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hive-transport: the worker↔master contract, twice.
//!
//! One [`Transport`] trait; two interchangeable implementations:
//! *Direct* (Redis Streams, worker talks straight to the broker) and
//! *Gateway* (gRPC proxy). Both provide at-least-once delivery with
//! idempotent receipts; engine code depends only on the trait.

pub mod backoff;
pub mod direct;
pub mod gateway;
pub mod receipt;
pub mod wire;

use hive_core::{ControlMessage, Heartbeat, LogEntry, RunId, Task, TaskResult};
use std::time::Duration;

/// Generated protobuf/tonic types for Gateway mode.
pub mod proto {
    #![allow(clippy::all)]
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    tonic::include_proto!("hive.gateway.v1");
}

/// Which transport binding a worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Direct,
    Gateway,
}

hive_core::wire_enum! {
    TransportMode {
        Direct => "direct",
        Gateway => "gateway",
    }
}

/// Transport failures, split by retry policy.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Transient: connection-level trouble; retry with backoff.
    #[error("connection error: {0}")]
    Connection(String),

    /// Transient: an operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Permanent: credentials rejected or worker unknown.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Permanent: the peer sent something we cannot parse.
    #[error("malformed message: {0}")]
    Protocol(String),

    #[error("transport is closed")]
    Closed,

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("channel error: {0}")]
    Channel(#[from] tonic::transport::Error),
}

impl TransportError {
    /// Whether automatic retry with backoff is appropriate.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connection(_) | TransportError::Timeout(_) => true,
            TransportError::Auth(_) | TransportError::Protocol(_) | TransportError::Closed => false,
            TransportError::Redis(e) => {
                e.is_connection_dropped() || e.is_io_error() || e.is_timeout()
            }
            TransportError::Rpc(status) => matches!(
                status.code(),
                tonic::Code::Unavailable | tonic::Code::DeadlineExceeded | tonic::Code::Aborted
            ),
            TransportError::Channel(_) => true,
        }
    }
}

/// The one contract both transports implement.
///
/// Receipts are opaque strings minted by the transport on delivery and
/// passed back verbatim on ack. Every method is idempotent from the
/// master's point of view: duplicates of any send/ack leave externally
/// observable state unchanged.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    fn mode(&self) -> TransportMode;

    /// Connect, authenticate, and prepare server-side structures
    /// (consumer groups / registration). Must be called before polling.
    async fn start(&self) -> Result<(), TransportError>;

    /// Wait up to `timeout` for one task.
    async fn poll_task(&self, timeout: Duration) -> Result<Option<Task>, TransportError>;

    /// Confirm (or reject) a delivery. `accepted=false` requeues the
    /// original payload before acking, preserving at-least-once.
    async fn ack_task(
        &self,
        receipt: &str,
        accepted: bool,
        reason: &str,
    ) -> Result<bool, TransportError>;

    /// Report a terminal result. May be called more than once per run;
    /// the master deduplicates by `run_id`.
    async fn report_result(&self, result: &TaskResult) -> Result<bool, TransportError>;

    /// Ship a batch of log entries. Duplicate `(run_id, seq)` entries
    /// must be treated as already delivered.
    async fn send_log_batch(&self, entries: &[LogEntry]) -> Result<(), TransportError>;

    /// Ship an oversize payload out-of-band.
    async fn send_log_chunk(
        &self,
        run_id: RunId,
        chunk_id: &str,
        index: u32,
        total: u32,
        data: &[u8],
    ) -> Result<(), TransportError>;

    async fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), TransportError>;

    /// Wait up to `timeout` for one control message.
    async fn poll_control(&self, timeout: Duration)
        -> Result<Option<ControlMessage>, TransportError>;

    async fn ack_control(&self, receipt: &str) -> Result<(), TransportError>;

    /// Answer a runtime-control request on the reply channel.
    async fn report_control_result(
        &self,
        control_id: &str,
        result: &serde_json::Value,
    ) -> Result<(), TransportError>;

    /// Tear down and re-establish the connection.
    async fn reconnect(&self) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

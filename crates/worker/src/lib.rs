// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hive-worker: the per-worker execution engine.
//!
//! Pulls tasks from the transport, schedules them through a bounded
//! priority queue, resolves runtimes, executes child processes with a
//! durable log pipeline, reports results, and keeps the master informed
//! via heartbeats. One engine per worker process.

pub mod artifacts;
pub mod capabilities;
pub mod config;
pub mod engine;
pub mod heartbeat;
pub mod identity;
pub mod scheduler;
pub mod state;
pub mod wiring;

#[cfg(test)]
mod test_util;

pub use artifacts::ArtifactStore;
pub use config::{ConfigError, TransportSection, WorkerConfig, WorkerOverrides};
pub use engine::{Engine, EngineConfig, EngineDeps};
pub use heartbeat::{HeartbeatReporter, MetricsCollector, MetricsSource, ReporterConfig, ReporterState};
pub use identity::WorkerIdentity;
pub use scheduler::Scheduler;
pub use state::StateManager;
pub use wiring::{preflight, Container, PreflightCheck};

use hive_core::RunId;

/// Errors from the worker engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("scheduler queue is full ({capacity} queued)")]
    QueueFull { capacity: usize },

    #[error("unknown run {0}")]
    UnknownRun(RunId),

    #[error("invalid state transition for {run_id}: {from} → {to}")]
    InvalidTransition { run_id: RunId, from: hive_core::RunState, to: hive_core::RunState },

    #[error("artifact hash mismatch: expected {expected}, got {actual}")]
    ArtifactHashMismatch { expected: String, actual: String },

    #[error("artifact fetch failed: {0}")]
    ArtifactFetch(String),

    #[error("worker identity unavailable: {0}")]
    Identity(String),

    #[error(transparent)]
    Runtime(#[from] hive_runtime::RuntimeError),

    #[error(transparent)]
    Exec(#[from] hive_exec::ExecError),

    #[error(transparent)]
    Pipeline(#[from] hive_logpipe::PipelineError),

    #[error(transparent)]
    Transport(#[from] hive_transport::TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identity and registry records.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a worker instance.
///
/// Worker ids come from configuration or from the master's registration
/// endpoint, so unlike run/task ids they have no fixed shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for WorkerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WorkerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for WorkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Liveness of a registered worker as judged by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Online,
    Offline,
}

crate::wire_enum! {
    WorkerStatus {
        Online => "online",
        Offline => "offline",
    }
}

/// Registry record for one worker, stored as a hash field on the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: WorkerId,
    /// Batch this worker is pinned to, if batch-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub active_tasks: u32,
    pub status: WorkerStatus,
    /// Epoch ms of the last heartbeat observed.
    pub last_heartbeat_ms: u64,
    pub registered_at_ms: u64,
    #[serde(default)]
    pub total_completed: u64,
    #[serde(default)]
    pub total_failed: u64,
}

impl WorkerInfo {
    pub fn new(worker_id: WorkerId, now_ms: u64) -> Self {
        Self {
            worker_id,
            batch_id: None,
            active_tasks: 0,
            status: WorkerStatus::Online,
            last_heartbeat_ms: now_ms,
            registered_at_ms: now_ms,
            total_completed: 0,
            total_failed: 0,
        }
    }
}

crate::builder! {
    pub struct WorkerInfoBuilder => WorkerInfo {
        set {
            worker_id: WorkerId = WorkerId::new("wrk-test"),
            active_tasks: u32 = 0,
            status: WorkerStatus = WorkerStatus::Online,
            last_heartbeat_ms: u64 = 1_000_000,
            registered_at_ms: u64 = 1_000_000,
            total_completed: u64 = 0,
            total_failed: u64 = 0,
        }
        option {
            batch_id: String = None,
        }
    }
}

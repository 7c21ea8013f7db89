// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat payload types.

use crate::capability::CapabilityMap;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};

/// Point-in-time resource metrics included in every heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub disk_percent: f32,
    pub running_tasks: u32,
    pub max_concurrent_tasks: u32,
}

/// Host facts collected once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub os_type: String,
    pub os_version: String,
    pub python_version: String,
    pub machine_arch: String,
}

/// Crawl counters merged into heartbeats while a spider project is active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiderStats {
    pub pages_crawled: u64,
    pub requests_failed: u64,
    pub items_scraped: u64,
}

/// Periodic liveness + metrics report.
///
/// Last-writer-wins by `ts_ms`; the master never merges two heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: WorkerId,
    /// Engine status string: "running", "degraded", "draining".
    pub status: String,
    pub metrics: WorkerMetrics,
    pub os_info: OsInfo,
    #[serde(default)]
    pub capabilities: CapabilityMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spider_stats: Option<SpiderStats>,
    pub ts_ms: u64,
    // Identity block echoed so the master can rebuild a registry entry
    // from any single heartbeat.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub version: String,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task wire entity and result reporting.

use crate::id::{RunId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of project a task belongs to, which decides how the worker
/// materializes and launches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    /// A python code bundle run via its entry point.
    Code,
    /// A crawler project driven by the spider framework.
    Spider,
    /// A single script file.
    File,
}

crate::wire_enum! {
    ProjectType {
        Code => "code",
        Spider => "spider",
        File => "file",
    }
}

/// Terminal outcome of a run.
///
/// A closed set with one canonical wire spelling each; consumers must
/// never see ad-hoc status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failed,
    Cancelled,
    Timeout,
}

crate::wire_enum! {
    TaskStatus {
        Success => "success",
        Failed => "failed",
        Cancelled => "cancelled",
        Timeout => "timeout",
    }
}

impl TaskStatus {
    /// Conventional process exit code for this outcome when the child
    /// itself did not provide one.
    pub fn default_exit_code(&self) -> i32 {
        match self {
            TaskStatus::Success => 0,
            TaskStatus::Failed => 1,
            TaskStatus::Cancelled => 130,
            TaskStatus::Timeout => 124,
        }
    }
}

/// A task as delivered by the transport.
///
/// `receipt` is transport-opaque: the Direct transport encodes
/// `"stream_key|msg_id"`, the Gateway hands back an opaque server string.
/// It is never interpreted by the engine, only passed back on ack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub run_id: RunId,
    pub project_id: String,
    pub project_type: ProjectType,
    /// Lower value = higher priority.
    pub priority: i32,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    /// Extra environment variables for the child process.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    pub timeout_s: u64,
    /// Where to fetch the project artifact; empty means nothing to fetch.
    #[serde(default)]
    pub download_url: String,
    /// SHA-256 of the artifact, used as the cache key.
    #[serde(default)]
    pub file_hash: String,
    #[serde(default)]
    pub entry_point: String,
    /// Artifact is a zstd-compressed bundle.
    #[serde(default)]
    pub is_compressed: bool,
    /// Opaque transport receipt used for ack/requeue.
    #[serde(default)]
    pub receipt: String,
}

impl Task {
    /// Times this delivery has been handed to a consumer, parsed out of
    /// `params` when the transport annotated it (reclaimed deliveries).
    pub fn delivery_count(&self) -> u64 {
        self.params
            .get("delivery_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
    }
}

/// Result of one run, reported back to the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub exit_code: i32,
    #[serde(default)]
    pub error_message: String,
    /// Epoch milliseconds.
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub duration_ms: u64,
    /// Structured payload produced by the task, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TaskResult {
    /// Build a failure result that never ran a process.
    ///
    /// Used when preparation fails (runtime build, artifact fetch) and
    /// the engine still owes the master a terminal report.
    pub fn preparation_failure(
        run_id: RunId,
        task_id: TaskId,
        error: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            run_id,
            task_id,
            status: TaskStatus::Failed,
            exit_code: TaskStatus::Failed.default_exit_code(),
            error_message: error.into(),
            started_at_ms: now_ms,
            finished_at_ms: now_ms,
            duration_ms: 0,
            data: None,
        }
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            project_id: String = "proj-1",
            download_url: String = "",
            file_hash: String = "",
            entry_point: String = "main.py",
            receipt: String = "",
        }
        set {
            project_type: ProjectType = ProjectType::Code,
            priority: i32 = 5,
            params: HashMap<String, serde_json::Value> = HashMap::new(),
            environment: HashMap<String, String> = HashMap::new(),
            timeout_s: u64 = 60,
            is_compressed: bool = false,
        }
        computed {
            task_id: TaskId = TaskId::new(),
            run_id: RunId = RunId::new(),
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;

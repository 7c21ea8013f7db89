// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution plan and result types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum bytes per emitted log line; longer output is split.
pub const MAX_LINE_BYTES: usize = 8192;

/// Everything needed to run one child process.
#[derive(Debug, Clone)]
pub struct ExecPlan {
    pub command: String,
    pub args: Vec<String>,
    /// Merged over the worker's own environment; wins on conflict.
    pub env: HashMap<String, String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    /// How long after the polite stop before the hard kill.
    pub grace_period: Duration,
    /// CPU-seconds cap, if the platform can apply one.
    pub cpu_limit_seconds: Option<u64>,
    /// Resident-set cap in MiB, if the platform can apply one.
    pub memory_limit_mb: Option<u64>,
}

impl ExecPlan {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: cwd.into(),
            timeout: Duration::from_secs(3600),
            grace_period: Duration::from_secs(5),
            cpu_limit_seconds: None,
            memory_limit_mb: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Success,
    Failed,
    TimedOut,
    Cancelled,
}

impl ExecStatus {
    pub fn as_task_status(&self) -> hive_core::TaskStatus {
        match self {
            ExecStatus::Success => hive_core::TaskStatus::Success,
            ExecStatus::Failed => hive_core::TaskStatus::Failed,
            ExecStatus::TimedOut => hive_core::TaskStatus::Timeout,
            ExecStatus::Cancelled => hive_core::TaskStatus::Cancelled,
        }
    }
}

/// Outcome of one execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub status: ExecStatus,
    pub exit_code: i32,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub duration_ms: u64,
    pub error_message: Option<String>,
}

/// Exit code reported for timed-out runs, matching coreutils `timeout`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported for cancelled runs (SIGINT convention).
pub const CANCELLED_EXIT_CODE: i32 = 130;

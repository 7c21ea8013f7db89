// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log entry wire type.

use crate::id::RunId;
use serde::{Deserialize, Serialize};

/// Which output stream a log entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Worker-generated lines (lifecycle notices, kill reasons).
    System,
}

crate::wire_enum! {
    LogStream {
        Stdout => "stdout",
        Stderr => "stderr",
        System => "system",
    }
}

/// One log line emitted by a run.
///
/// `seq` starts at 1 and is strictly increasing within `(run_id, stream)`
/// with no gaps; downstream consumers deduplicate replays by
/// `(run_id, seq)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub run_id: RunId,
    pub stream: LogStream,
    pub seq: u64,
    /// Epoch milliseconds at emission.
    pub ts_ms: u64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl LogEntry {
    pub fn new(run_id: RunId, stream: LogStream, seq: u64, ts_ms: u64, content: impl Into<String>) -> Self {
        Self { run_id, stream, seq, ts_ms, content: content.into(), level: None }
    }

    /// Explicit stream entry ID used for idempotent XADD: `"<ts_ms>-<seq>"`.
    pub fn stream_entry_id(&self) -> String {
        format!("{}-{}", self.ts_ms, self.seq)
    }
}

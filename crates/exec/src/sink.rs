// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log emission seam between the executor and the log pipeline.

use hive_core::{LogEntry, LogStream, RunId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives log entries as the child produces them.
///
/// Implementations must be cheap and non-blocking; the executor calls
/// `emit` from the output reader tasks.
pub trait LogSink: Send + Sync {
    fn emit(&self, entry: LogEntry);
}

/// Per-run sequence counter shared across stdout/stderr/system.
///
/// Sequences start at 1 and are contiguous within a run, so downstream
/// consumers can deduplicate replays by `(run_id, seq)`.
#[derive(Debug, Clone)]
pub struct SeqCounter(Arc<AtomicU64>);

impl SeqCounter {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    /// Next sequence number (first call returns 1).
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Highest sequence handed out so far.
    pub fn last(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for SeqCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink that buffers entries in memory. Test helper and drain target.
#[derive(Default)]
pub struct CollectingSink {
    entries: parking_lot::Mutex<Vec<LogEntry>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn lines_for(&self, stream: LogStream) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.stream == stream)
            .map(|e| e.content.clone())
            .collect()
    }

    pub fn seqs_for(&self, run_id: &RunId) -> Vec<u64> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.run_id == *run_id)
            .map(|e| e.seq)
            .collect()
    }
}

impl LogSink for CollectingSink {
    fn emit(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }
}

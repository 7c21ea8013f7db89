// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spool: durable cursor pair over the WAL.
//!
//! `last_seq` is the highest entry written; `acked_seq` the highest
//! confirmed by the transport. `(acked_seq, last_seq]` is exactly the
//! window a reconnecting worker must re-emit. Cursors are persisted to
//! `meta.json` so a restarted worker resumes from the right place.

use crate::wal::RunWal;
use crate::PipelineError;
use hive_core::LogEntry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const META_FILE: &str = "meta.json";

/// Persisted cursor state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolMeta {
    pub last_seq: u64,
    pub acked_seq: u64,
}

/// Durable buffer between the log producer and the transport sender.
pub struct Spool {
    dir: PathBuf,
    wal: RunWal,
    meta: SpoolMeta,
}

impl Spool {
    /// Open the spool for a run, restoring cursors from a prior process.
    ///
    /// The WAL is the source of truth for `last_seq`: if the process
    /// died after WAL writes but before a meta flush, the replayed WAL
    /// wins.
    pub fn open(spool_root: &Path, wal: RunWal) -> Result<Self, PipelineError> {
        let dir = spool_root.join(wal.run_id().as_str());
        std::fs::create_dir_all(&dir)?;

        let meta_path = dir.join(META_FILE);
        let mut meta = if meta_path.exists() {
            let raw = std::fs::read_to_string(&meta_path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            SpoolMeta::default()
        };
        meta.last_seq = meta.last_seq.max(wal.last_seq());
        meta.acked_seq = meta.acked_seq.min(meta.last_seq);

        Ok(Self { dir, wal, meta })
    }

    pub fn last_seq(&self) -> u64 {
        self.meta.last_seq
    }

    pub fn acked_seq(&self) -> u64 {
        self.meta.acked_seq
    }

    /// Entries written but not yet confirmed.
    pub fn unacked_count(&self) -> u64 {
        self.meta.last_seq - self.meta.acked_seq
    }

    /// Append an entry to the WAL and advance the write cursor.
    pub fn append(&mut self, entry: &LogEntry) -> Result<(), PipelineError> {
        self.wal.append(entry)?;
        self.meta.last_seq = self.meta.last_seq.max(entry.seq);
        Ok(())
    }

    /// Flush WAL buffers and persist cursors.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        self.wal.flush()?;
        self.persist_meta()
    }

    /// Advance the ack cursor (monotonic: stale acks are ignored).
    pub fn ack(&mut self, seq: u64) -> Result<(), PipelineError> {
        if seq <= self.meta.acked_seq {
            return Ok(());
        }
        self.meta.acked_seq = seq.min(self.meta.last_seq);
        self.persist_meta()
    }

    /// Records in `(acked_seq, last_seq]`, in seq order — a consistent
    /// snapshot of everything the transport still owes us confirmation
    /// for.
    pub fn iter_unacked(&mut self) -> Result<Vec<LogEntry>, PipelineError> {
        let (from, to) = (self.meta.acked_seq, self.meta.last_seq);
        self.wal.read_range(from, to)
    }

    /// Whether every written entry has been confirmed.
    pub fn fully_acked(&self) -> bool {
        self.meta.acked_seq == self.meta.last_seq
    }

    /// Access to the underlying WAL (for archival).
    pub fn wal(&self) -> &RunWal {
        &self.wal
    }

    /// Delete WAL and spool state. Only valid once fully acked (or when
    /// the run is being discarded deliberately).
    pub fn purge(self) -> Result<(), PipelineError> {
        self.wal.purge()?;
        std::fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    fn persist_meta(&self) -> Result<(), PipelineError> {
        let tmp = self.dir.join(format!("{META_FILE}.tmp"));
        std::fs::write(&tmp, serde_json::to_string(&self.meta)?)?;
        std::fs::rename(&tmp, self.dir.join(META_FILE))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "spool_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run write-ahead log.
//!
//! One append-only JSON-lines file per `(run, stream)` under the run's
//! WAL directory. Records survive process restart; the file is purged
//! only once every entry has been acked by the transport.

use crate::PipelineError;
use hive_core::{LogEntry, LogStream, RunId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// On-disk record. The run id is implied by the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalRecord {
    seq: u64,
    ts_ms: u64,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level: Option<String>,
}

/// Append-only WAL for one run.
pub struct RunWal {
    run_id: RunId,
    dir: PathBuf,
    writers: HashMap<LogStream, BufWriter<File>>,
    last_seq: u64,
}

impl RunWal {
    /// Open (or create) the WAL directory for a run.
    ///
    /// Scans existing files so `last_seq` continues where a previous
    /// process stopped.
    pub fn open(wal_root: &Path, run_id: RunId) -> Result<Self, PipelineError> {
        let dir = wal_root.join(run_id.as_str());
        std::fs::create_dir_all(&dir)?;

        let mut last_seq = 0;
        for stream in [LogStream::Stdout, LogStream::Stderr, LogStream::System] {
            let path = stream_path(&dir, stream);
            if path.exists() {
                for record in read_records(&path)? {
                    last_seq = last_seq.max(record.seq);
                }
            }
        }

        Ok(Self { run_id, dir, writers: HashMap::new(), last_seq })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Highest sequence ever appended (including prior processes).
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Append one entry. Buffered; call [`RunWal::flush`] to make durable.
    pub fn append(&mut self, entry: &LogEntry) -> Result<(), PipelineError> {
        let record = WalRecord {
            seq: entry.seq,
            ts_ms: entry.ts_ms,
            content: entry.content.clone(),
            level: entry.level.clone(),
        };
        let line = serde_json::to_string(&record)?;

        let writer = match self.writers.entry(entry.stream) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(stream_path(&self.dir, entry.stream))?;
                e.insert(BufWriter::new(file))
            }
        };
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;

        self.last_seq = self.last_seq.max(entry.seq);
        Ok(())
    }

    /// Flush buffered writes and fsync each stream file.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Read all entries with `from_seq < seq ≤ to_seq`, ordered by seq.
    ///
    /// Merges every stream file; used by spool recovery to re-emit
    /// unacked entries in original order.
    pub fn read_range(&mut self, from_seq: u64, to_seq: u64) -> Result<Vec<LogEntry>, PipelineError> {
        // Buffered writers must land before we read the files back.
        self.flush()?;

        let mut entries = Vec::new();
        for stream in [LogStream::Stdout, LogStream::Stderr, LogStream::System] {
            let path = stream_path(&self.dir, stream);
            if !path.exists() {
                continue;
            }
            for record in read_records(&path)? {
                if record.seq > from_seq && record.seq <= to_seq {
                    entries.push(LogEntry {
                        run_id: self.run_id,
                        stream,
                        seq: record.seq,
                        ts_ms: record.ts_ms,
                        content: record.content,
                        level: record.level,
                    });
                }
            }
        }
        entries.sort_by_key(|e| e.seq);
        Ok(entries)
    }

    /// Paths of existing stream files (for archival).
    pub fn stream_files(&self) -> Vec<(LogStream, PathBuf)> {
        [LogStream::Stdout, LogStream::Stderr, LogStream::System]
            .into_iter()
            .map(|s| (s, stream_path(&self.dir, s)))
            .filter(|(_, p)| p.exists())
            .collect()
    }

    /// Delete the run's WAL directory. Only call once fully acked.
    pub fn purge(self) -> Result<(), PipelineError> {
        std::fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

fn stream_path(dir: &Path, stream: LogStream) -> PathBuf {
    dir.join(format!("{}.log", stream.as_wire_str()))
}

fn read_records(path: &Path) -> Result<Vec<WalRecord>, PipelineError> {
    let file = File::open(path)?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            // A torn final line from a crash mid-write is expected;
            // anything else is corruption worth surfacing in logs.
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping bad WAL line"),
        }
    }
    Ok(records)
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hive_core::test_support::log_entry;
use tempfile::tempdir;

fn rid() -> RunId {
    RunId::from_string("r1")
}

#[test]
fn open_creates_run_directory() {
    let dir = tempdir().unwrap();
    let wal = RunWal::open(dir.path(), rid()).unwrap();
    assert!(dir.path().join("r1").exists());
    assert_eq!(wal.last_seq(), 0);
}

#[test]
fn append_tracks_last_seq() {
    let dir = tempdir().unwrap();
    let mut wal = RunWal::open(dir.path(), rid()).unwrap();
    wal.append(&log_entry("r1", 1, "a")).unwrap();
    wal.append(&log_entry("r1", 2, "b")).unwrap();
    assert_eq!(wal.last_seq(), 2);
}

#[test]
fn read_range_is_ordered_and_bounded() {
    let dir = tempdir().unwrap();
    let mut wal = RunWal::open(dir.path(), rid()).unwrap();
    for seq in 1..=5 {
        wal.append(&log_entry("r1", seq, &format!("line-{seq}"))).unwrap();
    }
    let entries = wal.read_range(1, 4).unwrap();
    let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![2, 3, 4]);
}

#[test]
fn read_range_merges_streams_in_seq_order() {
    let dir = tempdir().unwrap();
    let mut wal = RunWal::open(dir.path(), rid()).unwrap();

    let mut e1 = log_entry("r1", 1, "out");
    e1.stream = LogStream::Stdout;
    let mut e2 = log_entry("r1", 2, "err");
    e2.stream = LogStream::Stderr;
    let mut e3 = log_entry("r1", 3, "out2");
    e3.stream = LogStream::Stdout;
    for e in [&e1, &e2, &e3] {
        wal.append(e).unwrap();
    }

    let entries = wal.read_range(0, 3).unwrap();
    let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(entries[1].stream, LogStream::Stderr);
}

#[test]
fn reopen_recovers_last_seq_across_restart() {
    let dir = tempdir().unwrap();
    {
        let mut wal = RunWal::open(dir.path(), rid()).unwrap();
        for seq in 1..=7 {
            wal.append(&log_entry("r1", seq, "x")).unwrap();
        }
        wal.flush().unwrap();
    }
    let wal = RunWal::open(dir.path(), rid()).unwrap();
    assert_eq!(wal.last_seq(), 7);
}

#[test]
fn write_n_then_reopen_returns_same_records_in_order() {
    let dir = tempdir().unwrap();
    {
        let mut wal = RunWal::open(dir.path(), rid()).unwrap();
        for seq in 1..=10 {
            wal.append(&log_entry("r1", seq, &format!("line-{seq}"))).unwrap();
        }
        wal.flush().unwrap();
    }
    let mut wal = RunWal::open(dir.path(), rid()).unwrap();
    let entries = wal.read_range(0, 10).unwrap();
    assert_eq!(entries.len(), 10);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.seq, i as u64 + 1);
        assert_eq!(entry.content, format!("line-{}", i + 1));
    }
}

#[test]
fn torn_trailing_line_is_skipped() {
    let dir = tempdir().unwrap();
    {
        let mut wal = RunWal::open(dir.path(), rid()).unwrap();
        wal.append(&log_entry("r1", 1, "good")).unwrap();
        wal.flush().unwrap();
    }
    // Simulate a crash mid-write.
    let path = dir.path().join("r1").join("stdout.log");
    let mut existing = std::fs::read_to_string(&path).unwrap();
    existing.push_str("{\"seq\":2,\"ts_ms\":1");
    std::fs::write(&path, existing).unwrap();

    let mut wal = RunWal::open(dir.path(), rid()).unwrap();
    assert_eq!(wal.last_seq(), 1);
    let entries = wal.read_range(0, 10).unwrap();
    assert_eq!(entries.len(), 1);
}

#[test]
fn purge_removes_directory() {
    let dir = tempdir().unwrap();
    let mut wal = RunWal::open(dir.path(), rid()).unwrap();
    wal.append(&log_entry("r1", 1, "x")).unwrap();
    wal.flush().unwrap();
    wal.purge().unwrap();
    assert!(!dir.path().join("r1").exists());
}

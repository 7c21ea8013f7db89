// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn save_and_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("identity").join("worker_identity.yaml");
    let identity = WorkerIdentity::new("w-123", "key-456");
    identity.save(&path).unwrap();

    let loaded = WorkerIdentity::load(&path).unwrap().unwrap();
    assert_eq!(loaded, identity);
}

#[test]
fn missing_file_is_none() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.yaml");
    assert!(WorkerIdentity::load(&path).unwrap().is_none());
}

#[test]
fn corrupt_file_is_treated_as_absent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("worker_identity.yaml");
    std::fs::write(&path, ": not yaml {{{").unwrap();
    assert!(WorkerIdentity::load(&path).unwrap().is_none());
}

#[test]
fn generated_local_identities_are_unique() {
    let a = WorkerIdentity::generate_local("crawler");
    let b = WorkerIdentity::generate_local("crawler");
    assert_ne!(a.worker_id, b.worker_id);
    assert!(a.worker_id.starts_with("crawler-"));
}

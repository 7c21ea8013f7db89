// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn generated_ids_have_prefix_and_fixed_length() {
    let id = RunId::new();
    assert!(id.as_str().starts_with("run-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);

    let id = TaskId::new();
    assert!(id.as_str().starts_with("tsk-"));

    let id = BatchId::new();
    assert!(id.as_str().starts_with("bat-"));
}

#[test]
fn generated_ids_are_unique() {
    let a = RunId::new();
    let b = RunId::new();
    assert_ne!(a, b);
}

#[test]
fn from_string_accepts_short_external_ids() {
    let id = RunId::from_string("r1");
    assert_eq!(id.as_str(), "r1");
    assert_eq!(id, "r1");
}

#[test]
fn idbuf_hashes_like_str() {
    use std::collections::HashMap;
    let mut map: HashMap<RunId, u32> = HashMap::new();
    map.insert(RunId::from_string("r1"), 7);
    // Borrow<str> lookup without allocating a RunId
    assert_eq!(map.get("r1"), Some(&7));
}

#[test]
fn serde_roundtrip_is_transparent() {
    let id = TaskId::from_string("t42");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"t42\"");
    let back: TaskId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn deserialize_rejects_oversized_ids() {
    let long = format!("\"{}\"", "x".repeat(ID_MAX_LEN + 1));
    let result: Result<RunId, _> = serde_json::from_str(&long);
    assert!(result.is_err());
}

#[test]
fn empty_idbuf() {
    let buf = IdBuf::empty();
    assert!(buf.is_empty());
    assert_eq!(buf.as_str(), "");
}

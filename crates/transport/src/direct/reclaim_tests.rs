// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use redis::Value;

fn bulk(s: &str) -> Value {
    Value::BulkString(s.as_bytes().to_vec())
}

fn entry(id: &str, fields: &[(&str, &str)]) -> Value {
    let mut flat = Vec::new();
    for (k, v) in fields {
        flat.push(bulk(k));
        flat.push(bulk(v));
    }
    Value::Array(vec![bulk(id), Value::Array(flat)])
}

#[test]
fn parses_redis7_reply_with_deleted_ids() {
    let reply = Value::Array(vec![
        bulk("0-0"),
        Value::Array(vec![
            entry("1-0", &[("task_id", "t1"), ("run_id", "r1")]),
            entry("2-0", &[("task_id", "t2"), ("run_id", "r2")]),
        ]),
        Value::Array(vec![]),
    ]);
    let entries = parse_autoclaim_entries(reply);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "1-0");
    assert_eq!(entries[0].1.get("task_id").map(String::as_str), Some("t1"));
    assert_eq!(entries[1].1.get("run_id").map(String::as_str), Some("r2"));
}

#[test]
fn parses_redis62_reply_without_deleted_ids() {
    let reply = Value::Array(vec![
        bulk("0-0"),
        Value::Array(vec![entry("3-0", &[("task_id", "t3")])]),
    ]);
    let entries = parse_autoclaim_entries(reply);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "3-0");
}

#[test]
fn parses_resp3_map_fields() {
    let fields = Value::Map(vec![(bulk("task_id"), bulk("t4"))]);
    let reply = Value::Array(vec![
        bulk("0-0"),
        Value::Array(vec![Value::Array(vec![bulk("4-0"), fields])]),
    ]);
    let entries = parse_autoclaim_entries(reply);
    assert_eq!(entries[0].1.get("task_id").map(String::as_str), Some("t4"));
}

#[test]
fn tolerates_empty_and_malformed_replies() {
    assert!(parse_autoclaim_entries(Value::Nil).is_empty());
    assert!(parse_autoclaim_entries(Value::Array(vec![])).is_empty());
    assert!(parse_autoclaim_entries(Value::Array(vec![bulk("0-0")])).is_empty());

    // An entry that is not a pair is skipped, not fatal.
    let reply = Value::Array(vec![
        bulk("0-0"),
        Value::Array(vec![Value::Int(42), entry("5-0", &[("task_id", "t5")])]),
    ]);
    let entries = parse_autoclaim_entries(reply);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "5-0");
}

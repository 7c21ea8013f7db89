// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[test]
fn receipt_roundtrip() {
    let receipt = encode_receipt("hive:task:ready:w1", "1718-0");
    let (stream, msg) = decode_receipt(&receipt).unwrap();
    assert_eq!(stream, "hive:task:ready:w1");
    assert_eq!(msg, "1718-0");
}

#[test]
fn decode_rejects_malformed_receipts() {
    assert!(decode_receipt("no-separator").is_err());
    assert!(decode_receipt("|msg").is_err());
    assert!(decode_receipt("stream|").is_err());
    assert!(decode_receipt("").is_err());
}

#[test]
fn decode_uses_last_separator_for_streams_containing_pipes() {
    let (stream, msg) = decode_receipt("a|b|1-0").unwrap();
    assert_eq!(stream, "a|b");
    assert_eq!(msg, "1-0");
}

#[test]
fn cache_returns_stored_outcome_within_ttl() {
    let cache = ReceiptCache::new(Duration::from_secs(60));
    cache.put(result_key("t1"), true);
    assert_eq!(cache.get(&result_key("t1")), Some(true));
    assert_eq!(cache.get(&result_key("t2")), None);
}

#[test]
fn cache_stores_negative_outcomes_too() {
    let cache = ReceiptCache::new(Duration::from_secs(60));
    cache.put(ack_key("t1"), false);
    assert_eq!(cache.get(&ack_key("t1")), Some(false));
}

#[test]
fn cache_expires_entries() {
    let cache = ReceiptCache::new(Duration::from_millis(10));
    cache.put(result_key("t1"), true);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(cache.get(&result_key("t1")), None);
    assert!(cache.is_empty());
}

#[test]
fn key_helpers_are_namespaced() {
    assert_eq!(result_key("t9"), "result:t9");
    assert_eq!(ack_key("t9"), "ack:t9");
    assert_ne!(result_key("t9"), ack_key("t9"));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn keys_follow_namespace_layout() {
    let keys = Keys::new("hive", "w1");
    assert_eq!(keys.ready(), "hive:task:ready:w1");
    assert_eq!(keys.result(), "hive:task:result");
    assert_eq!(keys.dead_letter(), "hive:task:dead:w1");
    assert_eq!(keys.log_stream("r1"), "hive:log:stream:r1");
    assert_eq!(keys.log_chunk("r1"), "hive:log:chunk:r1");
    assert_eq!(keys.control(), "hive:control:w1");
    assert_eq!(keys.control_global(), "hive:control:global");
    assert_eq!(keys.control_reply(), "hive:control:reply:w1");
    assert_eq!(keys.heartbeat(), "hive:heartbeat:w1");
    assert_eq!(keys.direct_proof(), "hive:direct:proof:w1");
    assert_eq!(keys.workers_group(), "hive:workers");
    assert_eq!(keys.control_group(), "hive:control");
}

#[test]
fn namespaces_are_isolated() {
    let a = Keys::new("staging", "w1");
    let b = Keys::new("prod", "w1");
    assert_ne!(a.ready(), b.ready());
    assert_ne!(a.result(), b.result());
}

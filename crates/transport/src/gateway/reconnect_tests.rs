// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn manager(max_attempts: u32) -> ReconnectManager {
    ReconnectManager::new(
        Backoff { base: Duration::from_millis(100), cap: Duration::from_secs(1), jitter: 0.0 },
        max_attempts,
    )
}

#[test]
fn starts_idle() {
    assert_eq!(manager(0).state(), ConnState::Idle);
}

#[test]
fn first_connect_goes_through_connecting() {
    let m = manager(0);
    m.on_connecting();
    assert_eq!(m.state(), ConnState::Connecting);
    m.on_connected();
    assert_eq!(m.state(), ConnState::Connected);
    assert_eq!(m.attempts(), 0);
}

#[test]
fn reconnect_after_established_is_reconnecting() {
    let m = manager(0);
    m.on_connecting();
    m.on_connected();
    m.on_connecting();
    assert_eq!(m.state(), ConnState::Reconnecting);
}

#[test]
fn failures_back_off_exponentially() {
    let m = manager(0);
    m.on_connecting();
    let d1 = m.on_failure().unwrap();
    let d2 = m.on_failure().unwrap();
    assert_eq!(d1, Duration::from_millis(100));
    assert_eq!(d2, Duration::from_millis(200));
    assert_eq!(m.state(), ConnState::Reconnecting);
}

#[test]
fn attempt_budget_exhaustion_fails_the_manager() {
    let m = manager(3);
    m.on_connecting();
    assert!(m.on_failure().is_some());
    assert!(m.on_failure().is_some());
    assert!(m.on_failure().is_none());
    assert_eq!(m.state(), ConnState::Failed);
}

#[test]
fn success_resets_attempt_counter() {
    let m = manager(0);
    m.on_connecting();
    let _ = m.on_failure();
    let _ = m.on_failure();
    m.on_connected();
    assert_eq!(m.attempts(), 0);
    assert!(m.is_connected());
}

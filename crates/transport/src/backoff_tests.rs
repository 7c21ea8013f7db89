// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    none = { 0, 0 },
    first = { 1, 500 },
    second = { 2, 1_000 },
    third = { 3, 2_000 },
    seventh = { 7, 30_000 },   // 0.5 * 2^6 = 32s → capped
    huge = { 40, 30_000 },
)]
fn poll_delay_doubles_and_caps(failures: u32, expected_ms: u64) {
    assert_eq!(poll_delay(failures), Duration::from_millis(expected_ms));
}

#[test]
fn poll_backoff_tracks_consecutive_failures() {
    let mut backoff = PollBackoff::new();
    assert_eq!(backoff.remaining(), Duration::ZERO);

    let d1 = backoff.record_failure();
    let d2 = backoff.record_failure();
    assert!(d2 > d1);
    assert_eq!(backoff.failures(), 2);
    assert!(backoff.remaining() > Duration::ZERO);

    backoff.record_success();
    assert_eq!(backoff.failures(), 0);
    assert_eq!(backoff.remaining(), Duration::ZERO);
}

#[test]
fn backoff_without_jitter_is_deterministic() {
    let backoff = Backoff { base: Duration::from_secs(1), cap: Duration::from_secs(8), jitter: 0.0 };
    assert_eq!(backoff.delay(1), Duration::from_secs(1));
    assert_eq!(backoff.delay(2), Duration::from_secs(2));
    assert_eq!(backoff.delay(3), Duration::from_secs(4));
    assert_eq!(backoff.delay(4), Duration::from_secs(8));
    assert_eq!(backoff.delay(10), Duration::from_secs(8));
}

#[test]
fn jitter_stays_within_bounds() {
    let backoff = Backoff { base: Duration::from_secs(4), cap: Duration::from_secs(60), jitter: 0.5 };
    for _ in 0..100 {
        let delay = backoff.delay(1);
        assert!(delay <= Duration::from_secs(4));
        assert!(delay >= Duration::from_secs(2));
    }
}

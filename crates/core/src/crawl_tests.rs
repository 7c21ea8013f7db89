// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn priority_order_is_high_normal_low() {
    assert_eq!(Priority::ORDERED, [Priority::High, Priority::Normal, Priority::Low]);
    assert!(Priority::High < Priority::Normal);
    assert!(Priority::Normal < Priority::Low);
}

#[parameterized(
    negative = { -3, Priority::High },
    zero = { 0, Priority::High },
    two = { 2, Priority::High },
    three = { 3, Priority::Normal },
    five = { 5, Priority::Normal },
    seven = { 7, Priority::Normal },
    eight = { 8, Priority::Low },
    large = { 99, Priority::Low },
)]
fn from_int_buckets(n: i32, expected: Priority) {
    assert_eq!(Priority::from_int(n), expected);
}

#[test]
fn int_roundtrip_through_buckets() {
    for p in Priority::ORDERED {
        assert_eq!(Priority::from_int(p.as_int()), p);
    }
}

#[parameterized(
    pending_to_dispatched = { CrawlTaskStatus::Pending, CrawlTaskStatus::Dispatched },
    dispatched_to_running = { CrawlTaskStatus::Dispatched, CrawlTaskStatus::Running },
    running_to_success = { CrawlTaskStatus::Running, CrawlTaskStatus::Success },
    running_to_retry = { CrawlTaskStatus::Running, CrawlTaskStatus::Retry },
    running_to_timeout = { CrawlTaskStatus::Running, CrawlTaskStatus::Timeout },
    running_to_failed = { CrawlTaskStatus::Running, CrawlTaskStatus::Failed },
    retry_to_dispatched = { CrawlTaskStatus::Retry, CrawlTaskStatus::Dispatched },
    timeout_to_dispatched = { CrawlTaskStatus::Timeout, CrawlTaskStatus::Dispatched },
    timeout_to_failed = { CrawlTaskStatus::Timeout, CrawlTaskStatus::Failed },
)]
fn legal_transitions(from: CrawlTaskStatus, to: CrawlTaskStatus) {
    assert!(from.can_transition(to));
}

#[parameterized(
    pending_to_running = { CrawlTaskStatus::Pending, CrawlTaskStatus::Running },
    success_to_retry = { CrawlTaskStatus::Success, CrawlTaskStatus::Retry },
    failed_to_dispatched = { CrawlTaskStatus::Failed, CrawlTaskStatus::Dispatched },
    retry_to_running = { CrawlTaskStatus::Retry, CrawlTaskStatus::Running },
)]
fn illegal_transitions(from: CrawlTaskStatus, to: CrawlTaskStatus) {
    assert!(!from.can_transition(to));
}

#[test]
fn seed_tasks_start_pending_at_depth_zero_high_priority() {
    let task = CrawlTask::seed("https://example.com/", "b1", 123);
    assert_eq!(task.depth, 0);
    assert_eq!(task.priority, Priority::High);
    assert_eq!(task.status, CrawlTaskStatus::Pending);
    assert_eq!(task.retry_count, 0);
    assert!(task.parent_url.is_none());
}

#[test]
fn with_retry_bumps_counter_and_enters_retry() {
    let task = CrawlTask::seed("https://example.com/", "b1", 123);
    let retried = task.with_retry();
    assert_eq!(retried.retry_count, 1);
    assert_eq!(retried.status, CrawlTaskStatus::Retry);
    assert_eq!(retried.url, task.url);
    assert_eq!(retried.priority, task.priority);
}

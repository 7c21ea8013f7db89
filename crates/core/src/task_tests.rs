// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    success = { TaskStatus::Success, "success", 0 },
    failed = { TaskStatus::Failed, "failed", 1 },
    cancelled = { TaskStatus::Cancelled, "cancelled", 130 },
    timeout = { TaskStatus::Timeout, "timeout", 124 },
)]
fn status_wire_strings_and_exit_codes(status: TaskStatus, wire: &str, exit: i32) {
    assert_eq!(status.as_wire_str(), wire);
    assert_eq!(TaskStatus::from_wire_str(wire), Some(status));
    assert_eq!(status.default_exit_code(), exit);
}

#[test]
fn status_rejects_unknown_wire_string() {
    assert_eq!(TaskStatus::from_wire_str("exploded"), None);
}

#[parameterized(
    code = { ProjectType::Code, "code" },
    spider = { ProjectType::Spider, "spider" },
    file = { ProjectType::File, "file" },
)]
fn project_type_wire_strings(pt: ProjectType, wire: &str) {
    assert_eq!(pt.as_wire_str(), wire);
    assert_eq!(ProjectType::from_wire_str(wire), Some(pt));
}

#[test]
fn task_json_roundtrip() {
    let task = Task::builder().project_id("p9").entry_point("spider.py").build();
    let json = serde_json::to_string(&task).unwrap();
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(back, task);
}

#[test]
fn delivery_count_defaults_to_one() {
    let task = Task::builder().build();
    assert_eq!(task.delivery_count(), 1);
}

#[test]
fn delivery_count_reads_transport_annotation() {
    let mut task = Task::builder().build();
    task.params.insert("delivery_count".into(), serde_json::json!(3));
    assert_eq!(task.delivery_count(), 3);
}

#[test]
fn preparation_failure_is_terminal_with_zero_duration() {
    let task = Task::builder().build();
    let result =
        TaskResult::preparation_failure(task.run_id, task.task_id, "no interpreter", 9_000);
    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.duration_ms, 0);
    assert_eq!(result.error_message, "no interpreter");
}

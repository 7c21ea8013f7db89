// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    queued_to_preparing = { RunState::Queued, RunState::Preparing },
    queued_to_cancelled = { RunState::Queued, RunState::Cancelled },
    preparing_to_running = { RunState::Preparing, RunState::Running },
    preparing_to_failed = { RunState::Preparing, RunState::Failed },
    preparing_to_cancelled = { RunState::Preparing, RunState::Cancelled },
    running_to_completed = { RunState::Running, RunState::Completed },
    running_to_failed = { RunState::Running, RunState::Failed },
    running_to_cancelled = { RunState::Running, RunState::Cancelled },
    running_to_timed_out = { RunState::Running, RunState::TimedOut },
)]
fn legal_transitions(from: RunState, to: RunState) {
    assert!(from.can_transition(to), "{from} → {to} should be legal");
}

#[parameterized(
    queued_to_running = { RunState::Queued, RunState::Running },
    running_to_preparing = { RunState::Running, RunState::Preparing },
    completed_to_running = { RunState::Completed, RunState::Running },
    failed_to_queued = { RunState::Failed, RunState::Queued },
    cancelled_to_completed = { RunState::Cancelled, RunState::Completed },
    timed_out_to_running = { RunState::TimedOut, RunState::Running },
)]
fn illegal_transitions(from: RunState, to: RunState) {
    assert!(!from.can_transition(to), "{from} → {to} should be rejected");
}

#[test]
fn terminal_states_are_absorbing() {
    use RunState::*;
    let all = [Queued, Preparing, Running, Completed, Failed, Cancelled, TimedOut];
    for terminal in [Completed, Failed, Cancelled, TimedOut] {
        assert!(terminal.is_terminal());
        for to in all {
            assert!(!terminal.can_transition(to), "{terminal} must not leave terminal state");
        }
    }
}

#[test]
fn terminal_states_map_to_task_status() {
    assert_eq!(RunState::Completed.task_status(), Some(TaskStatus::Success));
    assert_eq!(RunState::TimedOut.task_status(), Some(TaskStatus::Timeout));
    assert_eq!(RunState::Running.task_status(), None);
    assert_eq!(RunState::Queued.task_status(), None);
}

#[test]
fn task_status_maps_back_to_run_state() {
    for status in [
        TaskStatus::Success,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
        TaskStatus::Timeout,
    ] {
        let state = RunState::from(status);
        assert_eq!(state.task_status(), Some(status));
    }
}

#[test]
fn new_context_is_queued() {
    let ctx = RunContext::new(RunId::from_string("r1"), TaskId::from_string("t1"));
    assert_eq!(ctx.state, RunState::Queued);
    assert_eq!(ctx.started_at_ms, 0);
    assert!(ctx.runtime_hash.is_none());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side run state machine.

use crate::id::{RunId, TaskId};
use crate::task::TaskStatus;
use serde::{Deserialize, Serialize};

/// State of one run on one worker.
///
/// ```text
/// Queued → Preparing → Running → Completed
///                    ↘ Failed | Cancelled | TimedOut
/// Preparing → Failed        (runtime resolution failed)
/// Preparing → Cancelled     (cancelled before launch)
/// ```
///
/// Terminal states are absorbing; anything else is rejected by
/// [`RunState::can_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Preparing,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

crate::wire_enum! {
    RunState {
        Queued => "queued",
        Preparing => "preparing",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        TimedOut => "timeout",
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled | RunState::TimedOut
        )
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition(&self, to: RunState) -> bool {
        use RunState::*;
        match (self, to) {
            (Queued, Preparing) => true,
            (Queued, Cancelled) => true,
            (Preparing, Running) => true,
            (Preparing, Failed) => true,
            (Preparing, Cancelled) => true,
            (Running, Completed) => true,
            (Running, Failed) => true,
            (Running, Cancelled) => true,
            (Running, TimedOut) => true,
            _ => false,
        }
    }

    /// Map a terminal run state to the wire-level task status.
    ///
    /// Returns `None` for non-terminal states.
    pub fn task_status(&self) -> Option<TaskStatus> {
        match self {
            RunState::Completed => Some(TaskStatus::Success),
            RunState::Failed => Some(TaskStatus::Failed),
            RunState::Cancelled => Some(TaskStatus::Cancelled),
            RunState::TimedOut => Some(TaskStatus::Timeout),
            _ => None,
        }
    }
}

impl From<TaskStatus> for RunState {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Success => RunState::Completed,
            TaskStatus::Failed => RunState::Failed,
            TaskStatus::Cancelled => RunState::Cancelled,
            TaskStatus::Timeout => RunState::TimedOut,
        }
    }
}

/// Per-execution record tracked by the worker engine.
///
/// Exactly one exists per in-flight task; `remove` on the state manager
/// frees it once the terminal state has been reported and acked.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub state: RunState,
    /// Epoch ms when the run entered `Running`; 0 until then.
    pub started_at_ms: u64,
    /// Epoch ms after which the run is overdue; 0 until running.
    pub deadline_ms: u64,
    /// Runtime hash of the resolved environment, once prepared.
    pub runtime_hash: Option<String>,
}

impl RunContext {
    pub fn new(run_id: RunId, task_id: TaskId) -> Self {
        Self {
            run_id,
            task_id,
            state: RunState::Queued,
            started_at_ms: 0,
            deadline_ms: 0,
            runtime_hash: None,
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;

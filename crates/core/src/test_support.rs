// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::id::{RunId, TaskId};
use crate::log::{LogEntry, LogStream};
use crate::runtime::RuntimeSpec;
use crate::task::{Task, TaskResult, TaskStatus};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core wire and state machine types.
pub mod strategies {
    use crate::batch::BatchStatus;
    use crate::run::RunState;
    use crate::runtime::RuntimeSpec;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    pub fn arb_run_state() -> impl Strategy<Value = RunState> {
        prop_oneof![
            Just(RunState::Queued),
            Just(RunState::Preparing),
            Just(RunState::Running),
            Just(RunState::Completed),
            Just(RunState::Failed),
            Just(RunState::Cancelled),
            Just(RunState::TimedOut),
        ]
    }

    pub fn arb_batch_status() -> impl Strategy<Value = BatchStatus> {
        prop_oneof![
            Just(BatchStatus::Pending),
            Just(BatchStatus::Running),
            Just(BatchStatus::Paused),
            Just(BatchStatus::Completed),
            Just(BatchStatus::Failed),
            Just(BatchStatus::Cancelled),
        ]
    }

    pub fn arb_runtime_spec() -> impl Strategy<Value = RuntimeSpec> {
        (
            "[0-9]\\.[0-9]{1,2}",
            proptest::collection::btree_set("[a-z][a-z0-9-]{0,12}", 0..8),
            proptest::collection::vec("[a-z][a-z0-9<>=.-]{0,16}", 0..4),
            proptest::collection::btree_map("[A-Z_]{1,8}", "[a-z0-9]{0,8}", 0..4),
        )
            .prop_map(|(python_version, requirements, constraints, env_vars)| RuntimeSpec {
                python_version,
                requirements,
                constraints,
                env_vars: env_vars.into_iter().collect::<BTreeMap<_, _>>(),
            })
    }
}

// ── Factory functions ───────────────────────────────────────────────────

pub fn task(task_id: &str, run_id: &str) -> Task {
    let mut t = Task::builder().build();
    t.task_id = TaskId::from_string(task_id);
    t.run_id = RunId::from_string(run_id);
    t
}

pub fn success_result(task: &Task, now_ms: u64) -> TaskResult {
    TaskResult {
        run_id: task.run_id,
        task_id: task.task_id,
        status: TaskStatus::Success,
        exit_code: 0,
        error_message: String::new(),
        started_at_ms: now_ms,
        finished_at_ms: now_ms + 10,
        duration_ms: 10,
        data: None,
    }
}

pub fn log_entry(run_id: &str, seq: u64, content: &str) -> LogEntry {
    LogEntry::new(RunId::from_string(run_id), LogStream::Stdout, seq, 1_000_000 + seq, content)
}

pub fn runtime_spec(python: &str, reqs: &[&str]) -> RuntimeSpec {
    let mut spec = RuntimeSpec::new(python);
    spec.requirements = reqs.iter().map(|s| s.to_string()).collect();
    spec
}

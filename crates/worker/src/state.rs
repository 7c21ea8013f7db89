// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run state manager.
//!
//! One [`RunContext`] per in-flight task, keyed by run id. Transitions
//! outside the run FSM are rejected without touching state and logged
//! at warn.

use crate::EngineError;
use hive_core::{RunContext, RunId, RunState, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

#[derive(Default)]
pub struct StateManager {
    runs: Mutex<HashMap<RunId, RunContext>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run in `Queued`. Re-registering an existing run id
    /// is a no-op (idempotent against duplicate deliveries).
    pub fn register(&self, run_id: RunId, task_id: TaskId) {
        self.runs.lock().entry(run_id).or_insert_with(|| RunContext::new(run_id, task_id));
    }

    pub fn get(&self, run_id: &RunId) -> Option<RunContext> {
        self.runs.lock().get(run_id).cloned()
    }

    pub fn contains(&self, run_id: &RunId) -> bool {
        self.runs.lock().contains_key(run_id)
    }

    /// Apply a transition, enforcing the FSM.
    pub fn transition(&self, run_id: &RunId, to: RunState) -> Result<RunState, EngineError> {
        let mut runs = self.runs.lock();
        let ctx = runs.get_mut(run_id).ok_or(EngineError::UnknownRun(*run_id))?;
        if !ctx.state.can_transition(to) {
            warn!(run_id = %run_id, from = %ctx.state, to = %to, "rejected state transition");
            return Err(EngineError::InvalidTransition { run_id: *run_id, from: ctx.state, to });
        }
        ctx.state = to;
        Ok(to)
    }

    /// Mark a run as launched: transition to Running and stamp timing.
    pub fn mark_running(
        &self,
        run_id: &RunId,
        started_at_ms: u64,
        timeout_s: u64,
    ) -> Result<(), EngineError> {
        self.transition(run_id, RunState::Running)?;
        let mut runs = self.runs.lock();
        if let Some(ctx) = runs.get_mut(run_id) {
            ctx.started_at_ms = started_at_ms;
            ctx.deadline_ms = started_at_ms + timeout_s * 1000;
        }
        Ok(())
    }

    pub fn set_runtime_hash(&self, run_id: &RunId, hash: &str) {
        if let Some(ctx) = self.runs.lock().get_mut(run_id) {
            ctx.runtime_hash = Some(hash.to_string());
        }
    }

    /// Runs currently in `Running`.
    pub fn running_count(&self) -> usize {
        self.runs.lock().values().filter(|c| c.state == RunState::Running).count()
    }

    /// Runs not yet terminal.
    pub fn active_count(&self) -> usize {
        self.runs.lock().values().filter(|c| !c.state.is_terminal()).count()
    }

    /// Drop a run's entry. Call after its result is reported and acked.
    pub fn remove(&self, run_id: &RunId) -> Option<RunContext> {
        self.runs.lock().remove(run_id)
    }

    pub fn run_ids(&self) -> Vec<RunId> {
        self.runs.lock().keys().copied().collect()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

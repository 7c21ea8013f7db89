// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue-depth backpressure tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Pressure state derived from queue depth as a fraction of capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Normal,
    /// Above the warning threshold: log, but accept.
    Warning,
    /// Above the critical threshold: optionally drop new entries.
    Critical,
    /// Queue full: writers wait for space or drop per policy.
    Blocked,
}

/// Thresholds as fractions of `max_queue_size`.
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    pub max_queue_size: usize,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    /// When critical, drop new entries instead of queueing them.
    pub drop_on_critical: bool,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            warning_threshold: 0.5,
            critical_threshold: 0.8,
            drop_on_critical: false,
        }
    }
}

/// Callback fired on every state transition: `(old, new)`.
pub type StateListener = Box<dyn Fn(QueueState, QueueState) + Send + Sync>;

/// Tracks depth against thresholds and fires the listener on crossings.
pub struct BackpressureGauge {
    config: BackpressureConfig,
    state: parking_lot::Mutex<QueueState>,
    listener: parking_lot::Mutex<Option<StateListener>>,
    total_dropped: AtomicU64,
}

impl BackpressureGauge {
    pub fn new(config: BackpressureConfig) -> Self {
        Self {
            config,
            state: parking_lot::Mutex::new(QueueState::Normal),
            listener: parking_lot::Mutex::new(None),
            total_dropped: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BackpressureConfig {
        &self.config
    }

    pub fn on_transition(&self, listener: StateListener) {
        *self.listener.lock() = Some(listener);
    }

    pub fn state(&self) -> QueueState {
        *self.state.lock()
    }

    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    pub fn record_dropped(&self) {
        self.total_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Classify a depth without mutating state.
    pub fn classify(&self, depth: usize) -> QueueState {
        let max = self.config.max_queue_size.max(1);
        if depth >= max {
            QueueState::Blocked
        } else if depth as f64 >= self.config.critical_threshold * max as f64 {
            QueueState::Critical
        } else if depth as f64 >= self.config.warning_threshold * max as f64 {
            QueueState::Warning
        } else {
            QueueState::Normal
        }
    }

    /// Update from the current depth; fires the listener on change.
    /// Returns the (possibly new) state.
    pub fn observe(&self, depth: usize) -> QueueState {
        let new = self.classify(depth);
        let mut state = self.state.lock();
        let old = *state;
        if new != old {
            *state = new;
            drop(state);
            if matches!(new, QueueState::Warning | QueueState::Critical | QueueState::Blocked) {
                warn!(?old, ?new, depth, "log queue pressure changed");
            }
            if let Some(listener) = self.listener.lock().as_ref() {
                listener(old, new);
            }
        }
        new
    }

    /// Whether a new entry should be dropped at this depth per policy.
    pub fn should_drop(&self, depth: usize) -> bool {
        self.config.drop_on_critical && self.classify(depth) >= QueueState::Critical
    }
}

impl PartialOrd for QueueState {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.rank().cmp(&other.rank()))
    }
}

impl QueueState {
    fn rank(&self) -> u8 {
        match self {
            QueueState::Normal => 0,
            QueueState::Warning => 1,
            QueueState::Critical => 2,
            QueueState::Blocked => 3,
        }
    }
}

#[cfg(test)]
#[path = "backpressure_tests.rs"]
mod tests;

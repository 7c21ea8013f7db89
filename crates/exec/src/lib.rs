// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! hive-exec: sandboxed child-process execution.
//!
//! Pure control of a subprocess: spawn with a merged environment, stream
//! stdout/stderr line-by-line into a [`LogSink`], enforce timeout with a
//! polite-stop → grace → hard-kill sequence, honor external cancellation.
//! No persistence; the only side effect is log emission.

mod executor;
mod plan;
mod sink;

pub use executor::ProcessExecutor;
pub use plan::{ExecPlan, ExecResult, ExecStatus};
pub use sink::{CollectingSink, LogSink, SeqCounter};

/// Errors from process execution.
///
/// Note that a non-zero exit, a timeout, or a cancel are *results*, not
/// errors — `ExecError` covers only failures to run the child at all.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn {command:?}: {source}")]
    SpawnFailed { command: String, source: std::io::Error },

    #[error("executor is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

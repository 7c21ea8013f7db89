// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hive-runtime: hash-identified python environment resolver.
//!
//! `resolve(RuntimeSpec) → RuntimeHandle`, idempotent by runtime hash.
//! Environments are built once under `<venvs_dir>/<hash>.partial/` and
//! atomically renamed into place; a half-built environment is never
//! visible under the final hash path.

mod command;
mod interpreter;
mod resolver;
mod validate;

pub use command::{run_command, CommandOutput};
pub use interpreter::{find_interpreter, InterpreterSource, PythonInterpreter};
pub use resolver::{RuntimeManifest, RuntimeResolver, MANIFEST_FILE};
pub use validate::validate_package_name;

use std::path::PathBuf;

/// Errors from runtime resolution.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("no python interpreter satisfies version {version:?}")]
    InterpreterNotFound { version: String },

    #[error("invalid package name {name:?}")]
    InvalidPackageName { name: String },

    #[error("{step} failed with exit code {exit_code}: {stderr}")]
    BuildFailed { step: &'static str, exit_code: i32, stderr: String },

    #[error("command {command:?} timed out after {timeout_s}s")]
    CommandTimeout { command: String, timeout_s: u64 },

    #[error("environment {path} has no manifest")]
    MissingManifest { path: PathBuf },

    #[error("failed to lock {path}: {source}")]
    LockFailed { path: PathBuf, source: std::io::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime environment model: what a task needs to run, and the handle
//! to a materialized environment.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Declaration of the python environment a task requires.
///
/// The identity of a runtime is [`RuntimeSpec::runtime_hash`], computed
/// over `python_version`, the sorted `requirements`, and `constraints` —
/// never over `env_vars`. Two specs that differ only in environment
/// variables share one materialized runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    pub python_version: String,
    /// Package requirement strings. A set: order never matters.
    #[serde(default)]
    pub requirements: BTreeSet<String>,
    /// Version constraint lines applied at install time, in order.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Per-run environment variables; excluded from the hash.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

impl RuntimeSpec {
    pub fn new(python_version: impl Into<String>) -> Self {
        Self {
            python_version: python_version.into(),
            requirements: BTreeSet::new(),
            constraints: Vec::new(),
            env_vars: BTreeMap::new(),
        }
    }

    /// Content hash identifying this runtime.
    ///
    /// SHA-256 over a canonical serialization of `(python_version,
    /// sorted requirements, constraints)`. Field boundaries use a NUL
    /// separator so `["ab", "c"]` and `["a", "bc"]` hash differently.
    pub fn runtime_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.python_version.as_bytes());
        hasher.update([0u8]);
        for req in &self.requirements {
            hasher.update(req.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([0u8]);
        for c in &self.constraints {
            hasher.update(c.as_bytes());
            hasher.update([0u8]);
        }
        hex_encode(&hasher.finalize())
    }
}

/// Handle to a materialized runtime environment.
///
/// Immutable once built; outlives any task referencing it. The resolver
/// only hands these out for directories containing a valid manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeHandle {
    /// Root of the environment directory (`<venvs_dir>/<hash>`).
    pub path: PathBuf,
    pub runtime_hash: String,
    /// Absolute path to the interpreter inside the environment.
    pub python_executable: PathBuf,
}

impl RuntimeHandle {
    /// Directory to prepend to PATH so the environment's tools win.
    pub fn bin_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.path.join("Scripts")
        } else {
            self.path.join("bin")
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;

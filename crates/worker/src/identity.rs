// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent worker identity.
//!
//! Gateway-mode workers obtain `{worker_id, api_key}` once via the
//! install-key flow and keep them in
//! `<data_dir>/identity/worker_identity.yaml` across restarts.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub worker_id: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

impl WorkerIdentity {
    pub fn new(worker_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { worker_id: worker_id.into(), api_key: api_key.into(), secret_key: None }
    }

    /// Mint a fresh local identity (Direct mode, no credential server).
    pub fn generate_local(name: &str) -> Self {
        Self::new(format!("{name}-{}", uuid::Uuid::new_v4()), String::new())
    }

    pub fn load(path: &Path) -> Result<Option<Self>, std::io::Error> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        match serde_yaml::from_str(&raw) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable identity file");
                Ok(None)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self).map_err(std::io::Error::other)?;
        std::fs::write(path, yaml)
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;

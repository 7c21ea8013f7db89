// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime resolver: `resolve(RuntimeSpec) → RuntimeHandle`.
//!
//! Environments live at `<venvs_dir>/<hash>/` with a `manifest.json`
//! marking them complete. Builds happen in `<hash>.partial/` under a
//! per-hash lock (in-process mutex + cross-process file lock), then
//! rename atomically into place.

use crate::interpreter::{find_interpreter, PythonInterpreter};
use crate::validate::validate_package_name;
use crate::{RuntimeError, CommandOutput};
use fs2::FileExt;
use hive_core::runtime::{RuntimeHandle, RuntimeSpec};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";

const VENV_CREATE_TIMEOUT: Duration = Duration::from_secs(120);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);

/// Completion marker and metadata for a built environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeManifest {
    pub runtime_hash: String,
    pub python_version: String,
    pub requirements: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Interpreter the venv was seeded from.
    pub interpreter: PathBuf,
    pub created_at: String,
    pub packages_count: usize,
}

/// Resolves runtime specs to materialized environments.
pub struct RuntimeResolver {
    venvs_dir: PathBuf,
    /// Interpreters registered via configuration: (version, executable).
    preregistered: Vec<(String, PathBuf)>,
    /// Per-hash build locks. The map mutex is held only to fetch the
    /// entry; the build itself holds the inner async lock.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RuntimeResolver {
    pub fn new(venvs_dir: impl Into<PathBuf>) -> Self {
        Self {
            venvs_dir: venvs_dir.into(),
            preregistered: Vec::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_preregistered(mut self, interpreters: Vec<(String, PathBuf)>) -> Self {
        self.preregistered = interpreters;
        self
    }

    pub fn venvs_dir(&self) -> &Path {
        &self.venvs_dir
    }

    /// Resolve a spec to a ready environment, building it if needed.
    ///
    /// Idempotent by runtime hash. Concurrent calls for the same hash
    /// serialize on the per-hash lock; the winner builds, the rest find
    /// the cache on re-check.
    pub async fn resolve(&self, spec: &RuntimeSpec) -> Result<RuntimeHandle, RuntimeError> {
        for req in &spec.requirements {
            validate_package_name(req)?;
        }

        let hash = spec.runtime_hash();
        if let Some(handle) = self.cached(&hash)? {
            return Ok(handle);
        }

        let lock = self.hash_lock(&hash);
        let _guard = lock.lock().await;

        // Double-check under the lock: another task may have finished
        // the build while we waited.
        if let Some(handle) = self.cached(&hash)? {
            return Ok(handle);
        }

        // Cross-process guard for workers sharing one venvs_dir.
        std::fs::create_dir_all(&self.venvs_dir)?;
        let lock_path = self.venvs_dir.join(format!("{hash}.lock"));
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file
            .lock_exclusive()
            .map_err(|source| RuntimeError::LockFailed { path: lock_path.clone(), source })?;

        let result = self.build(spec, &hash).await;

        let _ = lock_file.unlock();
        let _ = std::fs::remove_file(&lock_path);

        result
    }

    /// Return the handle for a completed environment, if one exists.
    fn cached(&self, hash: &str) -> Result<Option<RuntimeHandle>, RuntimeError> {
        let path = self.venvs_dir.join(hash);
        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&manifest_path)?;
        let manifest: RuntimeManifest = serde_json::from_str(&raw)?;
        Ok(Some(handle_for(&path, &manifest.runtime_hash)))
    }

    fn hash_lock(&self, hash: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(hash.to_string()).or_default())
    }

    /// Build the environment under `.partial` and rename into place.
    async fn build(&self, spec: &RuntimeSpec, hash: &str) -> Result<RuntimeHandle, RuntimeError> {
        let final_path = self.venvs_dir.join(hash);
        let partial = self.venvs_dir.join(format!("{hash}.partial"));

        let result = self.build_in(spec, hash, &partial, &final_path).await;
        if result.is_err() {
            // Never leave a half-built environment behind.
            let _ = std::fs::remove_dir_all(&partial);
        }
        result
    }

    async fn build_in(
        &self,
        spec: &RuntimeSpec,
        hash: &str,
        partial: &Path,
        final_path: &Path,
    ) -> Result<RuntimeHandle, RuntimeError> {
        let interpreter = find_interpreter(&spec.python_version, &self.preregistered).await?;
        info!(
            hash,
            python = %interpreter.executable.display(),
            requirements = spec.requirements.len(),
            "building runtime environment"
        );

        if partial.exists() {
            // Stale leftover from a crashed build.
            warn!(path = %partial.display(), "removing stale partial environment");
            std::fs::remove_dir_all(partial)?;
        }

        let partial_str = path_str(partial);
        let output = crate::run_command(
            &path_str(&interpreter.executable),
            &["-m", "venv", &partial_str],
            None,
            VENV_CREATE_TIMEOUT,
        )
        .await?;
        check_step("venv create", &output)?;

        if !spec.requirements.is_empty() {
            self.install_packages(spec, partial).await?;
        }

        let manifest = RuntimeManifest {
            runtime_hash: hash.to_string(),
            python_version: spec.python_version.clone(),
            requirements: spec.requirements.iter().cloned().collect(),
            constraints: spec.constraints.clone(),
            interpreter: interpreter.executable.clone(),
            created_at: hive_core::clock::iso8601(now_ms()),
            packages_count: spec.requirements.len(),
        };
        let manifest_json = serde_json::to_string_pretty(&manifest)?;
        std::fs::write(partial.join(MANIFEST_FILE), manifest_json)?;

        std::fs::rename(partial, final_path)?;
        info!(hash, path = %final_path.display(), "runtime environment ready");

        Ok(handle_for(final_path, hash))
    }

    async fn install_packages(
        &self,
        spec: &RuntimeSpec,
        partial: &Path,
    ) -> Result<(), RuntimeError> {
        let python = venv_python(partial);
        let python_str = path_str(&python);

        // Deterministic install: requirements arrive pre-sorted from the
        // set, plus an optional constraints file.
        let mut args: Vec<String> =
            vec!["-m".into(), "pip".into(), "install".into(), "--no-input".into()];

        let constraints_path = partial.join("constraints.txt");
        if !spec.constraints.is_empty() {
            std::fs::write(&constraints_path, spec.constraints.join("\n"))?;
            args.push("-c".into());
            args.push(path_str(&constraints_path));
        }
        args.extend(spec.requirements.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = crate::run_command(&python_str, &arg_refs, None, INSTALL_TIMEOUT).await?;
        check_step("package install", &output)
    }

    /// Drop a built environment (runtime-manage control path).
    pub async fn delete(&self, hash: &str) -> Result<bool, RuntimeError> {
        let lock = self.hash_lock(hash);
        let _guard = lock.lock().await;
        let path = self.venvs_dir.join(hash);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&path)?;
        info!(hash, "deleted runtime environment");
        Ok(true)
    }

    /// List hashes of completed environments.
    pub fn list(&self) -> Result<Vec<RuntimeManifest>, RuntimeError> {
        let mut manifests = Vec::new();
        if !self.venvs_dir.exists() {
            return Ok(manifests);
        }
        for entry in std::fs::read_dir(&self.venvs_dir)? {
            let entry = entry?;
            let manifest_path = entry.path().join(MANIFEST_FILE);
            if !manifest_path.exists() {
                continue;
            }
            let raw = std::fs::read_to_string(&manifest_path)?;
            match serde_json::from_str(&raw) {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => warn!(path = %manifest_path.display(), error = %e, "skipping unreadable manifest"),
            }
        }
        Ok(manifests)
    }
}

fn check_step(step: &'static str, output: &CommandOutput) -> Result<(), RuntimeError> {
    if output.success() {
        Ok(())
    } else {
        Err(RuntimeError::BuildFailed {
            step,
            exit_code: output.exit_code,
            stderr: tail(&output.stderr, 2000),
        })
    }
}

fn handle_for(path: &Path, hash: &str) -> RuntimeHandle {
    RuntimeHandle {
        path: path.to_path_buf(),
        runtime_hash: hash.to_string(),
        python_executable: venv_python(path),
    }
}

fn venv_python(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("Scripts").join("python.exe")
    } else {
        root.join("bin").join("python")
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Last `limit` bytes of text, on a char boundary.
fn tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;

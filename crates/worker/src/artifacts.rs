// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project artifact fetch and cache.
//!
//! Artifacts are content-addressed by `file_hash`; a cached copy is
//! reused across runs and workers never re-download an unchanged
//! project. Sources are `http(s)://` URLs or local paths (used by
//! tests and same-host deployments).

use crate::EngineError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct ArtifactStore {
    projects_dir: PathBuf,
    client: reqwest::Client,
}

impl ArtifactStore {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self { projects_dir: projects_dir.into(), client: reqwest::Client::new() }
    }

    /// Directory where a project/hash pair is materialized.
    pub fn cache_dir(&self, project_id: &str, file_hash: &str) -> PathBuf {
        let key = if file_hash.is_empty() { "latest" } else { file_hash };
        self.projects_dir.join(project_id).join(key)
    }

    /// Ensure the artifact is present locally; returns its directory.
    ///
    /// `is_compressed` marks a zstd bundle that is decompressed into the
    /// cache; otherwise the source is copied through as `entry files`.
    /// A non-empty `file_hash` is verified against the fetched bytes.
    pub async fn fetch(
        &self,
        project_id: &str,
        download_url: &str,
        file_hash: &str,
        is_compressed: bool,
    ) -> Result<PathBuf, EngineError> {
        let target = self.cache_dir(project_id, file_hash);
        if target.join(".complete").exists() {
            debug!(project_id, file_hash, "artifact cache hit");
            return Ok(target);
        }

        let source_path = Path::new(download_url);
        if download_url.starts_with("http://") || download_url.starts_with("https://") {
            let bytes = self.download(download_url).await?;
            verify_hash(&bytes, file_hash)?;
            self.materialize_bytes(&target, &bytes, is_compressed)?;
        } else if source_path.is_dir() {
            // Local directory source: copy its tree as-is.
            copy_tree(source_path, &target)?;
        } else if source_path.is_file() {
            let bytes = std::fs::read(source_path)?;
            verify_hash(&bytes, file_hash)?;
            self.materialize_bytes(&target, &bytes, is_compressed)?;
        } else {
            return Err(EngineError::ArtifactFetch(format!(
                "artifact source not found: {download_url}"
            )));
        }

        std::fs::write(target.join(".complete"), b"")?;
        info!(project_id, file_hash, path = %target.display(), "artifact materialized");
        Ok(target)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::ArtifactFetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::ArtifactFetch(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        let bytes =
            response.bytes().await.map_err(|e| EngineError::ArtifactFetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn materialize_bytes(
        &self,
        target: &Path,
        bytes: &[u8],
        is_compressed: bool,
    ) -> Result<(), EngineError> {
        std::fs::create_dir_all(target)?;
        if is_compressed {
            let decompressed = zstd::decode_all(bytes)
                .map_err(|e| EngineError::ArtifactFetch(format!("decompress: {e}")))?;
            std::fs::write(target.join("bundle"), decompressed)?;
        } else {
            std::fs::write(target.join("bundle"), bytes)?;
        }
        Ok(())
    }

    /// Copy the cached artifact into a run's private workspace.
    pub fn stage_into(&self, cached: &Path, workspace: &Path) -> Result<(), EngineError> {
        copy_tree(cached, workspace)?;
        // The marker is cache bookkeeping, not project content.
        let _ = std::fs::remove_file(workspace.join(".complete"));
        Ok(())
    }
}

fn verify_hash(bytes: &[u8], expected: &str) -> Result<(), EngineError> {
    if expected.is_empty() {
        return Ok(());
    }
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let actual: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();
    if actual != expected {
        return Err(EngineError::ArtifactHashMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;

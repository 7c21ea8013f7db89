// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional final step: compress a finished run's WAL and upload it to
//! object storage, then delete the local files.

use crate::pipeline::LogPipeline;
use crate::PipelineError;
use std::sync::Arc;
use tracing::info;

/// Where archives go.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Base URL; files are PUT to `{base_url}/{run_id}/{file}.zst`.
    pub base_url: String,
    /// zstd level (3 is the library default tradeoff).
    pub level: i32,
}

impl ArchiveConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), level: 3 }
    }
}

/// Compress and upload each WAL stream file for a completed run.
///
/// On success the pipeline's on-disk state is purged. Compression runs
/// on the blocking pool so it never stalls the executor workers.
pub async fn archive_run(
    pipeline: Arc<LogPipeline>,
    config: &ArchiveConfig,
    client: &reqwest::Client,
) -> Result<(), PipelineError> {
    let run_id = pipeline.run_id();
    let files = pipeline.wal_files();

    for (stream, path) in files {
        let level = config.level;
        let source = path.clone();
        let compressed = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, PipelineError> {
            let raw = std::fs::read(&source)?;
            Ok(zstd::encode_all(raw.as_slice(), level)?)
        })
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(e)))??;

        let url = format!(
            "{}/{}/{}.log.zst",
            config.base_url.trim_end_matches('/'),
            run_id,
            stream.as_wire_str()
        );
        let response = client.put(&url).body(compressed).send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::UploadFailed(response.status().as_u16()));
        }
        info!(run_id = %run_id, %url, "archived run log");
    }

    // Purge only if we are the last holder; otherwise cleanup belongs to
    // whoever still has the pipeline open.
    if let Ok(pipeline) = Arc::try_unwrap(pipeline) {
        pipeline.purge()?;
    }
    Ok(())
}

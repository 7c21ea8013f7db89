// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker configuration.
//!
//! Resolution order, later wins: built-in defaults → YAML file →
//! environment variables → CLI flags. Transport-mode constraints are
//! validated last and are fatal.

use hive_transport::TransportMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Errors from configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("transport.mode=direct requires redis_url")]
    DirectNeedsRedis,

    #[error("transport.mode=direct forbids gateway_host/gateway_port")]
    DirectForbidsGateway,

    #[error("transport.mode=gateway requires gateway_host")]
    GatewayNeedsHost,

    #[error("transport.mode=gateway forbids redis_url")]
    GatewayForbidsRedis,

    #[error("worker_id is required")]
    MissingWorkerId,

    #[error("bad value for {key}: {value:?}")]
    BadEnvValue { key: &'static str, value: String },

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: serde_yaml::Error },
}

/// Transport binding section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub mode: TransportMode,
    pub redis_url: Option<String>,
    pub gateway_host: Option<String>,
    pub gateway_port: Option<u16>,
    pub namespace: String,
    pub tls: bool,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            mode: TransportMode::Direct,
            redis_url: None,
            gateway_host: None,
            gateway_port: None,
            namespace: "hive".into(),
            tls: false,
            ca_cert: None,
            client_cert: None,
            client_key: None,
        }
    }
}

impl TransportSection {
    pub fn gateway_endpoint(&self) -> Option<String> {
        let host = self.gateway_host.as_ref()?;
        let port = self.gateway_port.unwrap_or(50051);
        let scheme = if self.tls { "https" } else { "http" };
        Some(format!("{scheme}://{host}:{port}"))
    }
}

/// Full worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub region: String,
    pub worker_id: Option<String>,
    pub api_key: Option<String>,
    /// One-shot install key used to obtain persistent credentials.
    pub worker_key: Option<String>,
    pub transport: TransportSection,
    pub max_concurrent_tasks: u32,
    pub heartbeat_interval_s: u64,
    pub poll_timeout_s: u64,
    pub grace_period_s: u64,
    pub max_queue_size: usize,
    pub data_dir: PathBuf,
    pub log_level: String,
    /// Object-storage base URL for archiving completed runs' WALs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_archive_url: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker".into(),
            host: "0.0.0.0".into(),
            port: 8900,
            region: String::new(),
            worker_id: None,
            api_key: None,
            worker_key: None,
            transport: TransportSection::default(),
            max_concurrent_tasks: 4,
            heartbeat_interval_s: 30,
            poll_timeout_s: 5,
            grace_period_s: 10,
            max_queue_size: 256,
            data_dir: PathBuf::from("./data"),
            log_level: "INFO".into(),
            log_archive_url: None,
        }
    }
}

/// CLI-provided overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct WorkerOverrides {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub transport_mode: Option<TransportMode>,
    pub redis_url: Option<String>,
    pub gateway_endpoint: Option<String>,
    pub worker_id: Option<String>,
    pub worker_key: Option<String>,
    pub log_level: Option<String>,
}

impl WorkerConfig {
    /// Load with full resolution: defaults → YAML (if present) → env →
    /// CLI overrides. Does not validate; call [`WorkerConfig::validate`].
    pub fn resolve(
        yaml_path: Option<&Path>,
        overrides: &WorkerOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = match yaml_path {
            Some(path) if path.exists() => Self::from_yaml(path)?,
            _ => Self::default(),
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        config.apply_env_map(&env)?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn from_yaml(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        serde_yaml::from_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Overlay environment variables (`WORKER_*`).
    pub fn apply_env_map(&mut self, env: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(mode) = env.get("WORKER_TRANSPORT_MODE") {
            self.transport.mode = TransportMode::from_wire_str(mode)
                .ok_or(ConfigError::BadEnvValue { key: "WORKER_TRANSPORT_MODE", value: mode.clone() })?;
        }
        if let Some(url) = env.get("WORKER_REDIS_URL") {
            self.transport.redis_url = Some(url.clone());
        }
        if let Some(host) = env.get("WORKER_GATEWAY_HOST") {
            self.transport.gateway_host = Some(host.clone());
        }
        if let Some(port) = env.get("WORKER_GATEWAY_PORT") {
            self.transport.gateway_port = Some(port.parse().map_err(|_| {
                ConfigError::BadEnvValue { key: "WORKER_GATEWAY_PORT", value: port.clone() }
            })?);
        }
        if let Some(id) = env.get("WORKER_ID") {
            self.worker_id = Some(id.clone());
        }
        if let Some(key) = env.get("WORKER_API_KEY") {
            self.api_key = Some(key.clone());
        }
        if let Some(key) = env.get("WORKER_KEY") {
            self.worker_key = Some(key.clone());
        }
        if let Some(n) = env.get("WORKER_MAX_CONCURRENT_TASKS") {
            self.max_concurrent_tasks = n.parse().map_err(|_| ConfigError::BadEnvValue {
                key: "WORKER_MAX_CONCURRENT_TASKS",
                value: n.clone(),
            })?;
        }
        if let Some(s) = env.get("WORKER_HEARTBEAT_INTERVAL") {
            self.heartbeat_interval_s = s.parse().map_err(|_| ConfigError::BadEnvValue {
                key: "WORKER_HEARTBEAT_INTERVAL",
                value: s.clone(),
            })?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &WorkerOverrides) {
        if let Some(name) = &overrides.name {
            self.name = name.clone();
        }
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(mode) = overrides.transport_mode {
            self.transport.mode = mode;
        }
        if let Some(url) = &overrides.redis_url {
            self.transport.redis_url = Some(url.clone());
        }
        if let Some(endpoint) = &overrides.gateway_endpoint {
            // Accept `host:port` or bare `host`.
            match endpoint.rsplit_once(':') {
                Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => {
                    self.transport.gateway_host = Some(host.to_string());
                    self.transport.gateway_port = port.parse().ok();
                }
                _ => self.transport.gateway_host = Some(endpoint.clone()),
            }
        }
        if let Some(id) = &overrides.worker_id {
            self.worker_id = Some(id.clone());
        }
        if let Some(key) = &overrides.worker_key {
            self.worker_key = Some(key.clone());
        }
        if let Some(level) = &overrides.log_level {
            self.log_level = level.clone();
        }
    }

    /// Enforce transport-mode constraints. Fatal on violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.transport.mode {
            TransportMode::Direct => {
                if self.transport.redis_url.is_none() {
                    return Err(ConfigError::DirectNeedsRedis);
                }
                if self.transport.gateway_host.is_some() || self.transport.gateway_port.is_some() {
                    return Err(ConfigError::DirectForbidsGateway);
                }
            }
            TransportMode::Gateway => {
                if self.transport.gateway_host.is_none() {
                    return Err(ConfigError::GatewayNeedsHost);
                }
                if self.transport.redis_url.is_some() {
                    return Err(ConfigError::GatewayForbidsRedis);
                }
            }
        }
        // In gateway mode a missing worker_id can be minted via the
        // install-key flow; everywhere else it is mandatory.
        if self.worker_id.is_none()
            && !(self.transport.mode == TransportMode::Gateway && self.worker_key.is_some())
        {
            return Err(ConfigError::MissingWorkerId);
        }
        Ok(())
    }

    // ── Derived paths (persisted state layout) ──────────────────────────

    pub fn runtimes_dir(&self) -> PathBuf {
        self.data_dir.join("runtimes")
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }

    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("logs").join("wal")
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.data_dir.join("logs").join("spool")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join("identity").join("worker_identity.yaml")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

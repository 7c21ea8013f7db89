// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency container, startup preflight, and graceful shutdown.
//!
//! The container is the single place collaborators are assembled; no
//! global mutable state exists outside it.

use crate::artifacts::ArtifactStore;
use crate::capabilities;
use crate::config::WorkerConfig;
use crate::engine::{Engine, EngineConfig, EngineDeps};
use crate::heartbeat::{
    HeartbeatIdentity, HeartbeatReporter, MetricsCollector, ReporterConfig,
};
use crate::identity::WorkerIdentity;
use crate::EngineError;
use hive_core::WorkerId;
use hive_exec::ProcessExecutor;
use hive_runtime::RuntimeResolver;
use hive_transport::direct::{DirectConfig, DirectTransport, ReclaimDaemon};
use hive_transport::gateway::{GatewayConfig, GatewayTransport};
use hive_transport::{Transport, TransportMode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One preflight check's outcome (for `doctor`).
#[derive(Debug, Clone)]
pub struct PreflightCheck {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

/// Assembled worker: everything `run` needs, wired once.
pub struct Container {
    pub config: WorkerConfig,
    pub worker_id: WorkerId,
    pub transport: Arc<dyn Transport>,
    pub engine: Arc<Engine>,
    pub heartbeat: Arc<HeartbeatReporter>,
    /// Present in Direct mode only.
    reclaimer: Option<ReclaimDaemon>,
    /// Concrete gateway handle for the bidi push stream.
    gateway: Option<Arc<GatewayTransport>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Build the full dependency graph from configuration.
    pub fn build(config: WorkerConfig) -> Result<Self, EngineError> {
        let identity = resolve_identity(&config)?;
        let worker_id = WorkerId::new(identity.worker_id.clone());

        for dir in [
            config.runtimes_dir(),
            config.projects_dir(),
            config.wal_dir(),
            config.spool_dir(),
            config.runs_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }

        let mut gateway = None;
        let (transport, reclaimer): (Arc<dyn Transport>, Option<ReclaimDaemon>) =
            match config.transport.mode {
                TransportMode::Direct => {
                    let redis_url = config.transport.redis_url.clone().unwrap_or_default();
                    let mut direct_config = DirectConfig::new(redis_url, worker_id.as_str());
                    direct_config.namespace = config.transport.namespace.clone();
                    direct_config.heartbeat_ttl =
                        Duration::from_secs(config.heartbeat_interval_s * 3);
                    let direct = Arc::new(DirectTransport::new(direct_config));
                    let reclaimer =
                        ReclaimDaemon::new(Arc::clone(&direct), Duration::from_secs(30));
                    (direct, Some(reclaimer))
                }
                TransportMode::Gateway => {
                    let endpoint = config
                        .transport
                        .gateway_endpoint()
                        .unwrap_or_else(|| "http://127.0.0.1:50051".to_string());
                    let mut gateway_config = GatewayConfig::new(
                        endpoint,
                        worker_id.as_str(),
                        identity.api_key.clone(),
                    );
                    gateway_config.tls = config.transport.tls;
                    gateway_config.ca_cert = config.transport.ca_cert.clone();
                    gateway_config.client_identity = match (
                        config.transport.client_cert.clone(),
                        config.transport.client_key.clone(),
                    ) {
                        (Some(cert), Some(key)) => Some((cert, key)),
                        _ => None,
                    };
                    let handle = Arc::new(GatewayTransport::new(gateway_config));
                    gateway = Some(Arc::clone(&handle));
                    (handle, None)
                }
            };

        let resolver = Arc::new(RuntimeResolver::new(config.runtimes_dir()));
        let executor = Arc::new(ProcessExecutor::new(config.max_concurrent_tasks as usize));
        let artifacts = Arc::new(ArtifactStore::new(config.projects_dir()));

        let engine_config = EngineConfig {
            max_concurrent: config.max_concurrent_tasks as usize,
            max_queue_size: config.max_queue_size,
            poll_timeout: Duration::from_secs(config.poll_timeout_s),
            control_poll_timeout: Duration::from_secs(config.poll_timeout_s),
            grace_period: Duration::from_secs(config.grace_period_s),
            wal_dir: config.wal_dir(),
            spool_dir: config.spool_dir(),
            runs_dir: config.runs_dir(),
            archive: config
                .log_archive_url
                .as_deref()
                .map(hive_logpipe::ArchiveConfig::new),
        };
        let engine = Arc::new(Engine::new(
            engine_config,
            EngineDeps {
                transport: Arc::clone(&transport),
                resolver,
                executor,
                artifacts,
            },
        ));

        let collector = Arc::new(MetricsCollector::new(
            Arc::clone(engine.states()),
            config.max_concurrent_tasks,
        ));
        let reporter_config = ReporterConfig {
            interval: Duration::from_secs(config.heartbeat_interval_s),
            ..ReporterConfig::default()
        };
        let heartbeat = Arc::new(HeartbeatReporter::new(
            worker_id.clone(),
            Arc::clone(&transport),
            collector,
            reporter_config,
            HeartbeatIdentity {
                name: config.name.clone(),
                host: config.host.clone(),
                port: config.port,
                region: config.region.clone(),
            },
            capabilities::detect_all(),
        ));

        Ok(Self { config, worker_id, transport, engine, heartbeat, reclaimer, gateway })
    }

    /// Start the transport and every loop; block until `cancel`, then
    /// drain. This is the worker's whole lifetime after config parsing.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), EngineError> {
        self.transport.start().await?;
        info!(worker_id = %self.worker_id, mode = %self.transport.mode(), "worker started");

        // Gateway mode: open the bidi stream so server pushes (cancel,
        // config updates) arrive without waiting for the next poll. The
        // sender half must stay alive or the stream closes.
        let mut _stream_tx = None;
        if let Some(gateway) = &self.gateway {
            match gateway.open_stream(cancel.clone()).await {
                Ok(outbound) => {
                    info!("gateway push stream established");
                    _stream_tx = Some(outbound);
                }
                Err(e) => warn!(error = %e, "gateway push stream unavailable, using polls"),
            }
        }

        let heartbeat_handle = {
            let reporter = Arc::clone(&self.heartbeat);
            let cancel = cancel.clone();
            tokio::spawn(async move { reporter.run(cancel).await })
        };

        let reclaim_handle = self.reclaimer.map(|daemon| {
            let cancel = cancel.clone();
            tokio::spawn(async move { daemon.run(cancel).await })
        });

        // The engine owns the drain; this returns after grace.
        self.engine.run(cancel.clone()).await;

        let _ = heartbeat_handle.await;
        if let Some(handle) = reclaim_handle {
            let _ = handle.await;
        }
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "transport close failed");
        }
        info!(worker_id = %self.worker_id, "worker stopped");
        Ok(())
    }
}

/// Load or mint the worker identity.
///
/// Priority: explicit config worker_id → persisted identity file →
/// (Direct mode) locally generated id. Gateway mode without any of
/// these requires the install-key flow, which lives with the master's
/// HTTP surface; its absence is a startup error here.
fn resolve_identity(config: &WorkerConfig) -> Result<WorkerIdentity, EngineError> {
    if let Some(worker_id) = &config.worker_id {
        return Ok(WorkerIdentity::new(
            worker_id.clone(),
            config.api_key.clone().unwrap_or_default(),
        ));
    }

    let path = config.identity_path();
    if let Some(identity) = WorkerIdentity::load(&path)? {
        info!(worker_id = %identity.worker_id, "loaded persisted identity");
        return Ok(identity);
    }

    match config.transport.mode {
        TransportMode::Direct => {
            let identity = WorkerIdentity::generate_local(&config.name);
            identity.save(&path)?;
            info!(worker_id = %identity.worker_id, "generated local identity");
            Ok(identity)
        }
        TransportMode::Gateway => Err(EngineError::Identity(
            "gateway mode requires worker_id/api_key or a completed install-key exchange".into(),
        )),
    }
}

/// Preflight checks for `doctor`.
pub async fn preflight(config: &WorkerConfig) -> Vec<PreflightCheck> {
    let mut checks = Vec::new();

    // Python interpreter reachable.
    let interpreter = hive_runtime::find_interpreter("3", &[]).await;
    checks.push(match interpreter {
        Ok(found) => PreflightCheck {
            name: "python-interpreter",
            ok: true,
            detail: format!("{} ({})", found.executable.display(), found.version),
        },
        Err(e) => PreflightCheck { name: "python-interpreter", ok: false, detail: e.to_string() },
    });

    // Package manager available (pip via interpreter, probed lazily).
    let pip = hive_runtime::run_command(
        "python3",
        &["-m", "pip", "--version"],
        None,
        Duration::from_secs(30),
    )
    .await;
    checks.push(match pip {
        Ok(output) if output.success() => PreflightCheck {
            name: "package-manager",
            ok: true,
            detail: output.stdout.trim().to_string(),
        },
        Ok(output) => PreflightCheck {
            name: "package-manager",
            ok: false,
            detail: output.stderr.trim().to_string(),
        },
        Err(e) => PreflightCheck { name: "package-manager", ok: false, detail: e.to_string() },
    });

    // Data directories writable.
    let data_check = (|| -> std::io::Result<()> {
        std::fs::create_dir_all(&config.data_dir)?;
        let probe = config.data_dir.join(".write-probe");
        std::fs::write(&probe, b"ok")?;
        std::fs::remove_file(&probe)
    })();
    checks.push(match data_check {
        Ok(()) => PreflightCheck {
            name: "data-dir",
            ok: true,
            detail: config.data_dir.display().to_string(),
        },
        Err(e) => PreflightCheck { name: "data-dir", ok: false, detail: e.to_string() },
    });

    // Configuration consistency.
    checks.push(match config.validate() {
        Ok(()) => PreflightCheck { name: "config", ok: true, detail: "valid".into() },
        Err(e) => PreflightCheck { name: "config", ok: false, detail: e.to_string() },
    });

    checks
}

#[cfg(test)]
#[path = "wiring_tests.rs"]
mod tests;

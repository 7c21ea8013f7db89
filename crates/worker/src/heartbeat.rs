// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat reporter.
//!
//! Periodic liveness + metrics upload with a failure-driven state
//! machine: consecutive failures shorten the interval for fast retry,
//! a sustained outage flips to DEGRADED (longer interval, reconnect
//! attempts), and the first success restores RUNNING.

use crate::state::StateManager;
use hive_core::{Capability, CapabilityMap, Heartbeat, OsInfo, WorkerId, WorkerMetrics};
use hive_transport::backoff::Backoff;
use hive_transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Disks, System};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reporter tuning. Defaults mirror production: 30s nominal, 1s floor,
/// 60s while degraded, 5 consecutive failures to degrade.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub interval: Duration,
    pub min_interval: Duration,
    pub degraded_interval: Duration,
    pub max_consecutive_failures: u32,
    pub reconnect_backoff: Backoff,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            min_interval: Duration::from_secs(1),
            degraded_interval: Duration::from_secs(60),
            max_consecutive_failures: 5,
            reconnect_backoff: Backoff {
                base: Duration::from_secs(1),
                cap: Duration::from_secs(60),
                jitter: 0.2,
            },
        }
    }
}

/// Reporter health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    Running,
    Degraded,
}

/// Supplies the metrics block of each heartbeat.
pub trait MetricsSource: Send + Sync {
    fn metrics(&self) -> WorkerMetrics;
}

/// Real metrics from sysinfo plus the engine's run counts.
pub struct MetricsCollector {
    system: Mutex<System>,
    states: Arc<StateManager>,
    max_concurrent: u32,
}

impl MetricsCollector {
    pub fn new(states: Arc<StateManager>, max_concurrent: u32) -> Self {
        Self { system: Mutex::new(System::new()), states, max_concurrent }
    }

    /// Host facts, collected once.
    pub fn os_info() -> OsInfo {
        OsInfo {
            os_type: std::env::consts::OS.to_string(),
            os_version: System::os_version().unwrap_or_default(),
            python_version: String::new(),
            machine_arch: std::env::consts::ARCH.to_string(),
        }
    }
}

impl MetricsSource for MetricsCollector {
    fn metrics(&self) -> WorkerMetrics {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_percent = system.global_cpu_info().cpu_usage();
        let total_mem = system.total_memory().max(1);
        let memory_percent = (system.used_memory() as f64 / total_mem as f64 * 100.0) as f32;

        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks
            .iter()
            .fold((0u64, 0u64), |(t, a), d| (t + d.total_space(), a + d.available_space()));
        let disk_percent = if total == 0 {
            0.0
        } else {
            ((total - available) as f64 / total as f64 * 100.0) as f32
        };

        WorkerMetrics {
            cpu_percent,
            memory_percent,
            disk_percent,
            running_tasks: self.states.running_count() as u32,
            max_concurrent_tasks: self.max_concurrent,
        }
    }
}

/// Identity fields echoed in every heartbeat.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatIdentity {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub region: String,
}

pub struct HeartbeatReporter {
    worker_id: WorkerId,
    transport: Arc<dyn Transport>,
    source: Arc<dyn MetricsSource>,
    config: ReporterConfig,
    identity: HeartbeatIdentity,
    os_info: OsInfo,
    capabilities: CapabilityMap,
    state: Mutex<ReporterState>,
    consecutive_failures: Mutex<u32>,
    /// Fired once when the reporter degrades.
    on_disconnect: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl HeartbeatReporter {
    pub fn new(
        worker_id: WorkerId,
        transport: Arc<dyn Transport>,
        source: Arc<dyn MetricsSource>,
        config: ReporterConfig,
        identity: HeartbeatIdentity,
        capabilities: CapabilityMap,
    ) -> Self {
        Self {
            worker_id,
            transport,
            source,
            config,
            identity,
            os_info: MetricsCollector::os_info(),
            capabilities,
            state: Mutex::new(ReporterState::Running),
            consecutive_failures: Mutex::new(0),
            on_disconnect: Mutex::new(None),
        }
    }

    pub fn on_disconnect(&self, callback: Box<dyn Fn() + Send + Sync>) {
        *self.on_disconnect.lock() = Some(callback);
    }

    pub fn state(&self) -> ReporterState {
        *self.state.lock()
    }

    pub fn consecutive_failures(&self) -> u32 {
        *self.consecutive_failures.lock()
    }

    /// Update a detected capability after startup (e.g. browser engine
    /// installed by a runtime-manage control).
    pub fn set_capability(&mut self, name: impl Into<String>, capability: Capability) {
        self.capabilities.insert(name.into(), capability);
    }

    fn build_heartbeat(&self, now_ms: u64) -> Heartbeat {
        let status = match self.state() {
            ReporterState::Running => "running",
            ReporterState::Degraded => "degraded",
        };
        Heartbeat {
            worker_id: self.worker_id.clone(),
            status: status.to_string(),
            metrics: self.source.metrics(),
            os_info: self.os_info.clone(),
            capabilities: self.capabilities.clone(),
            spider_stats: None,
            ts_ms: now_ms,
            name: self.identity.name.clone(),
            host: self.identity.host.clone(),
            port: self.identity.port,
            region: self.identity.region.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Send one heartbeat; returns the delay before the next.
    pub async fn beat_once(&self) -> Duration {
        let heartbeat = self.build_heartbeat(now_ms());
        match self.transport.send_heartbeat(&heartbeat).await {
            Ok(()) => {
                let was_degraded = {
                    let mut failures = self.consecutive_failures.lock();
                    *failures = 0;
                    let mut state = self.state.lock();
                    let was = *state == ReporterState::Degraded;
                    *state = ReporterState::Running;
                    was
                };
                if was_degraded {
                    info!(worker_id = %self.worker_id, "heartbeat recovered, leaving degraded mode");
                }
                debug!(worker_id = %self.worker_id, "heartbeat sent");
                self.config.interval
            }
            Err(e) => {
                let failures = {
                    let mut failures = self.consecutive_failures.lock();
                    *failures += 1;
                    *failures
                };
                warn!(
                    worker_id = %self.worker_id,
                    error = %e,
                    consecutive_failures = failures,
                    "heartbeat failed"
                );
                if failures >= self.config.max_consecutive_failures {
                    self.enter_degraded().await;
                    self.config.degraded_interval
                } else {
                    // Fast retry while the outage is fresh.
                    self.config.min_interval
                }
            }
        }
    }

    async fn enter_degraded(&self) {
        {
            let mut state = self.state.lock();
            if *state == ReporterState::Degraded {
                return;
            }
            *state = ReporterState::Degraded;
        }
        warn!(worker_id = %self.worker_id, "entering degraded mode");
        if let Some(callback) = self.on_disconnect.lock().as_ref() {
            callback();
        }

        // One bounded reconnect push; the loop keeps beating (and thus
        // retrying) at the degraded interval either way.
        for attempt in 1..=5u32 {
            match self.transport.reconnect().await {
                Ok(()) => {
                    info!(worker_id = %self.worker_id, "transport reconnected");
                    return;
                }
                Err(e) => {
                    let delay = self.config.reconnect_backoff.delay(attempt);
                    warn!(error = %e, ?delay, "reconnect attempt failed");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Beat until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            let delay = self.beat_once().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine loop: poll → schedule → prepare → execute → report → ack.
//!
//! Acceptance contract: a delivery is acked `accepted=true` only after
//! its result has been reported (or a durable failure decision made);
//! `accepted=false` requeues the payload. Unacked tasks survive worker
//! death and are reclaimed by another consumer.

use crate::artifacts::ArtifactStore;
use crate::scheduler::Scheduler;
use crate::state::StateManager;
use crate::EngineError;
use hive_core::{
    ControlKind, ControlMessage, LogEntry, RunId, RunState, RuntimeSpec, Task, TaskResult,
};
use hive_exec::{ExecPlan, ProcessExecutor};
use hive_logpipe::{
    BatchSender, BatcherConfig, LogBatchTransport, LogPipeline, PipelineConfig, PipelineError,
};
use hive_runtime::RuntimeResolver;
use hive_transport::Transport;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Engine tuning, assembled from [`crate::WorkerConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub poll_timeout: Duration,
    pub control_poll_timeout: Duration,
    pub grace_period: Duration,
    pub wal_dir: PathBuf,
    pub spool_dir: PathBuf,
    pub runs_dir: PathBuf,
    /// When set, completed runs compress their WAL and upload it here.
    pub archive: Option<hive_logpipe::ArchiveConfig>,
}

/// Settings that a config-update control may swap at runtime.
///
/// Readers clone the snapshot; writers replace it whole. Nothing here
/// is load-bearing for in-flight runs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub poll_timeout: Duration,
    pub grace_period: Duration,
}

/// Engine collaborators.
pub struct EngineDeps {
    pub transport: Arc<dyn Transport>,
    pub resolver: Arc<RuntimeResolver>,
    pub executor: Arc<ProcessExecutor>,
    pub artifacts: Arc<ArtifactStore>,
}

/// Forwards log batches from a run's pipeline to the transport.
struct TransportLogSink {
    transport: Arc<dyn Transport>,
}

#[async_trait::async_trait]
impl LogBatchTransport for TransportLogSink {
    async fn send_log_batch(&self, entries: &[LogEntry]) -> Result<(), PipelineError> {
        self.transport
            .send_log_batch(entries)
            .await
            .map_err(|e| PipelineError::SendRejected(e.to_string()))
    }
}

/// Bridges the executor's sync `LogSink` into the async pipeline.
struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<LogEntry>,
}

impl hive_exec::LogSink for ChannelSink {
    fn emit(&self, entry: LogEntry) {
        let _ = self.tx.send(entry);
    }
}

pub struct Engine {
    config: EngineConfig,
    settings: RwLock<EngineSettings>,
    deps: EngineDeps,
    scheduler: Arc<Scheduler>,
    states: Arc<StateManager>,
    /// Per-run cancel tokens for control-plane cancellation.
    cancels: Mutex<HashMap<RunId, CancellationToken>>,
    /// Client for archive uploads.
    http: reqwest::Client,
}

impl Engine {
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        let scheduler = Arc::new(Scheduler::new(config.max_queue_size));
        let settings = EngineSettings {
            poll_timeout: config.poll_timeout,
            grace_period: config.grace_period,
        };
        Self {
            config,
            settings: RwLock::new(settings),
            deps,
            scheduler,
            states: Arc::new(StateManager::new()),
            cancels: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
        }
    }

    pub fn states(&self) -> &Arc<StateManager> {
        &self.states
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings.read().clone()
    }

    /// Run all loops until `cancel` fires, then drain.
    ///
    /// `cancel` stops intake (poll loops) immediately; in-flight runs
    /// get up to the grace period before their tokens are cancelled.
    /// Tasks still unfinished then are left unacked for reclaim.
    pub async fn run(self: &Arc<Self>, cancel: CancellationToken) {
        let intake_done = CancellationToken::new();

        let poll_handle = {
            let engine = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.poll_loop(cancel).await })
        };
        let control_handle = {
            let engine = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.control_loop(cancel).await })
        };

        let mut workers = Vec::new();
        for slot in 0..self.config.max_concurrent {
            let engine = Arc::clone(self);
            let intake_done = intake_done.clone();
            workers.push(tokio::spawn(async move { engine.worker_loop(slot, intake_done).await }));
        }

        cancel.cancelled().await;
        info!("engine shutting down: draining in-flight runs");

        let _ = poll_handle.await;
        let _ = control_handle.await;

        // Let execution workers finish the queue + in-flight runs.
        let grace = self.settings().grace_period;
        intake_done.cancel();
        let drain = async {
            for worker in workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!("grace period elapsed, cancelling remaining runs");
            for (_, token) in self.cancels.lock().iter() {
                token.cancel();
            }
        }
    }

    /// Transport → scheduler intake.
    async fn poll_loop(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let timeout = self.settings().poll_timeout;
            let polled = tokio::select! {
                _ = cancel.cancelled() => return,
                polled = self.deps.transport.poll_task(timeout) => polled,
            };
            match polled {
                Ok(Some(task)) => self.admit(task).await,
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    // poll_task applies its own backoff pacing.
                    debug!(error = %e, "transient poll error");
                }
                Err(e) => {
                    error!(error = %e, "permanent transport error in poll loop");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// Admit a delivery into the scheduler, or bounce it back.
    async fn admit(&self, task: Task) {
        let run_id = task.run_id;
        if self.states.contains(&run_id) {
            // Duplicate delivery of a run we already own.
            debug!(run_id = %run_id, "ignoring duplicate delivery");
            return;
        }
        self.states.register(run_id, task.task_id);
        let receipt = task.receipt.clone();
        match self.scheduler.enqueue(task) {
            Ok(()) => debug!(run_id = %run_id, "task queued"),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "scheduler full, requeueing delivery");
                self.states.remove(&run_id);
                if let Err(ack_err) =
                    self.deps.transport.ack_task(&receipt, false, "scheduler full").await
                {
                    warn!(error = %ack_err, "failed to requeue overflow task");
                }
            }
        }
    }

    /// One execution worker: drain the scheduler until intake ends.
    async fn worker_loop(&self, slot: usize, intake_done: CancellationToken) {
        debug!(slot, "execution worker started");
        loop {
            let task = tokio::select! {
                task = self.scheduler.dequeue(Duration::from_secs(1)) => task,
                _ = intake_done.cancelled() => {
                    // Finish whatever is still queued, then stop.
                    match self.scheduler.try_dequeue() {
                        Some(task) => Some(task),
                        None => break,
                    }
                }
            };
            let Some(task) = task else { continue };
            if let Err(e) = self.process(task).await {
                error!(slot, error = %e, "run processing failed");
            }
        }
        debug!(slot, "execution worker stopped");
    }

    /// Execute one task end-to-end.
    async fn process(&self, task: Task) -> Result<(), EngineError> {
        let run_id = task.run_id;
        let cancel = CancellationToken::new();
        self.cancels.lock().insert(run_id, cancel.clone());

        let outcome = self.process_inner(&task, cancel).await;
        self.cancels.lock().remove(&run_id);

        match outcome {
            Ok(()) => Ok(()),
            Err(e) => {
                // Preparation failed before the executor took over:
                // record the failure as the run's terminal result.
                let _ = self.states.transition(&run_id, RunState::Failed);
                let result = TaskResult::preparation_failure(
                    run_id,
                    task.task_id,
                    e.to_string(),
                    now_ms(),
                );
                self.finish(&task, result).await;
                Err(e)
            }
        }
    }

    async fn process_inner(
        &self,
        task: &Task,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        let run_id = task.run_id;
        self.states.transition(&run_id, RunState::Preparing)?;

        // Runtime resolution. Failure is a terminal FAILED, not a retry.
        let spec = runtime_spec_from(task);
        let runtime = self.deps.resolver.resolve(&spec).await?;
        self.states.set_runtime_hash(&run_id, &runtime.runtime_hash);

        // Materialize the project into the run's workspace.
        let workspace = self.config.runs_dir.join(run_id.as_str());
        std::fs::create_dir_all(&workspace)?;
        if !task.download_url.is_empty() {
            let cached = self
                .deps
                .artifacts
                .fetch(&task.project_id, &task.download_url, &task.file_hash, task.is_compressed)
                .await?;
            self.deps.artifacts.stage_into(&cached, &workspace)?;
        }

        // Durable log pipeline + batch sender for this run.
        let pipeline = Arc::new(LogPipeline::open(
            &self.config.wal_dir,
            &self.config.spool_dir,
            run_id,
            PipelineConfig::default(),
        )?);
        let sender = BatchSender::new(
            Arc::clone(&pipeline),
            Arc::new(TransportLogSink { transport: Arc::clone(&self.deps.transport) }),
            BatcherConfig::default(),
        );
        let sender_cancel = CancellationToken::new();
        let sender_handle = {
            let stop = sender_cancel.clone();
            tokio::spawn(async move {
                sender.run(stop).await;
                sender
            })
        };

        // Sync executor emissions → async pipeline.
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<LogEntry>();
        let forward_pipeline = Arc::clone(&pipeline);
        let forwarder = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(e) = forward_pipeline.push(entry).await {
                    warn!(error = %e, "failed to buffer log entry");
                }
            }
        });

        let plan = exec_plan_from(task, &workspace, &runtime, self.settings().grace_period);
        self.states.mark_running(&run_id, now_ms(), task.timeout_s)?;
        info!(run_id = %run_id, task_id = %task.task_id, "run started");

        let exec_result = self
            .deps
            .executor
            .run(run_id, &plan, Some(&runtime), Arc::new(ChannelSink { tx }), cancel)
            .await?;

        // Close the sink chain and flush every remaining line.
        forwarder.await.ok();
        sender_cancel.cancel();
        if let Ok(sender) = sender_handle.await {
            if let Err(e) = sender.drain().await {
                warn!(run_id = %run_id, error = %e, "final log drain incomplete");
            }
        }
        pipeline.flush()?;

        let state = RunState::from(exec_result.status.as_task_status());
        let _ = self.states.transition(&run_id, state);

        let result = TaskResult {
            run_id,
            task_id: task.task_id,
            status: exec_result.status.as_task_status(),
            exit_code: exec_result.exit_code,
            error_message: exec_result.error_message.clone().unwrap_or_default(),
            started_at_ms: exec_result.started_at_ms,
            finished_at_ms: exec_result.finished_at_ms,
            duration_ms: exec_result.duration_ms,
            data: None,
        };
        info!(
            run_id = %run_id,
            status = %result.status,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "run finished"
        );
        self.finish(task, result).await;

        // Optional final step: ship the compressed WAL to object storage
        // once everything is delivered, then drop the local files.
        if let Some(archive) = &self.config.archive {
            if pipeline.fully_acked() {
                let archive = archive.clone();
                let client = self.http.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        hive_logpipe::archive_run(pipeline, &archive, &client).await
                    {
                        warn!(run_id = %run_id, error = %e, "log archive failed");
                    }
                });
            }
        }
        Ok(())
    }

    /// Report the result, then ack. Ack only after the report succeeded
    /// (or a duplicate was confirmed) so reclaim keeps the at-least-once
    /// guarantee on worker death in between.
    async fn finish(&self, task: &Task, result: TaskResult) {
        let mut reported = false;
        for attempt in 1..=3u32 {
            match self.deps.transport.report_result(&result).await {
                Ok(_) => {
                    reported = true;
                    break;
                }
                Err(e) if e.is_transient() && attempt < 3 => {
                    warn!(run_id = %result.run_id, error = %e, attempt, "result report failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                }
                Err(e) => {
                    error!(run_id = %result.run_id, error = %e, "giving up reporting result");
                    break;
                }
            }
        }
        if reported {
            if let Err(e) = self.deps.transport.ack_task(&task.receipt, true, "").await {
                warn!(run_id = %result.run_id, error = %e, "ack failed; task may be re-delivered");
            }
        }
        // Either way the run's entry is done locally.
        self.states.remove(&result.run_id);
    }

    // ── Control plane ───────────────────────────────────────────────────

    async fn control_loop(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let timeout = self.config.control_poll_timeout;
            let polled = tokio::select! {
                _ = cancel.cancelled() => return,
                polled = self.deps.transport.poll_control(timeout) => polled,
            };
            match polled {
                Ok(Some(message)) => self.handle_control(message).await,
                Ok(None) => {}
                Err(e) => {
                    debug!(error = %e, "control poll error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_control(&self, message: ControlMessage) {
        let receipt = message.receipt.clone();
        match message.kind {
            ControlKind::Cancel | ControlKind::Kill => {
                if let Some(run_id) = message.run_id.as_deref() {
                    let run_id = RunId::from_string(run_id);
                    match self.cancels.lock().get(&run_id) {
                        Some(token) => {
                            info!(run_id = %run_id, kind = %message.kind, "cancelling run");
                            token.cancel();
                        }
                        None => warn!(run_id = %run_id, "cancel for unknown run"),
                    }
                }
            }
            ControlKind::ConfigUpdate => {
                if let Some(payload) = &message.payload {
                    self.apply_config_update(payload);
                }
            }
            ControlKind::RuntimeManage => {
                let reply = self.handle_runtime_manage(message.payload.as_ref()).await;
                let control_id = message.task_id.as_deref().unwrap_or("runtime-manage");
                if let Err(e) =
                    self.deps.transport.report_control_result(control_id, &reply).await
                {
                    warn!(error = %e, "failed to report runtime-manage result");
                }
            }
        }
        if !receipt.is_empty() {
            if let Err(e) = self.deps.transport.ack_control(&receipt).await {
                warn!(error = %e, "failed to ack control message");
            }
        }
    }

    /// Atomic swap of non-critical settings.
    fn apply_config_update(&self, payload: &serde_json::Value) {
        let mut settings = self.settings.read().clone();
        if let Some(seconds) = payload.get("poll_timeout_s").and_then(|v| v.as_u64()) {
            settings.poll_timeout = Duration::from_secs(seconds.clamp(1, 60));
        }
        if let Some(seconds) = payload.get("grace_period_s").and_then(|v| v.as_u64()) {
            settings.grace_period = Duration::from_secs(seconds.clamp(1, 300));
        }
        *self.settings.write() = settings;
        info!("applied config update");
    }

    async fn handle_runtime_manage(&self, payload: Option<&serde_json::Value>) -> serde_json::Value {
        let action = payload
            .and_then(|p| p.get("action"))
            .and_then(|a| a.as_str())
            .unwrap_or("list");
        match action {
            "list" => match self.deps.resolver.list() {
                Ok(manifests) => serde_json::json!({ "ok": true, "environments": manifests }),
                Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
            },
            "delete" => {
                let hash = payload
                    .and_then(|p| p.get("runtime_hash"))
                    .and_then(|h| h.as_str())
                    .unwrap_or_default();
                match self.deps.resolver.delete(hash).await {
                    Ok(removed) => serde_json::json!({ "ok": true, "removed": removed }),
                    Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
                }
            }
            "build" => {
                let spec = payload
                    .and_then(|p| p.get("spec"))
                    .and_then(|s| serde_json::from_value::<RuntimeSpec>(s.clone()).ok());
                match spec {
                    Some(spec) => match self.deps.resolver.resolve(&spec).await {
                        Ok(handle) => {
                            serde_json::json!({ "ok": true, "runtime_hash": handle.runtime_hash })
                        }
                        Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
                    },
                    None => serde_json::json!({ "ok": false, "error": "missing spec" }),
                }
            }
            other => serde_json::json!({ "ok": false, "error": format!("unknown action {other:?}") }),
        }
    }

    /// External cancel entry point (wiring, tests).
    pub fn cancel_run(&self, run_id: &RunId) -> bool {
        match self.cancels.lock().get(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Build the runtime spec a task implies.
///
/// `params.python_version` / `params.requirements` / `params.constraints`
/// select the environment; absent fields fall back to a bare default
/// interpreter.
fn runtime_spec_from(task: &Task) -> RuntimeSpec {
    let mut spec = RuntimeSpec::new(
        task.params
            .get("python_version")
            .and_then(|v| v.as_str())
            .unwrap_or("3"),
    );
    if let Some(reqs) = task.params.get("requirements").and_then(|v| v.as_array()) {
        spec.requirements =
            reqs.iter().filter_map(|r| r.as_str()).map(str::to_string).collect();
    }
    if let Some(cons) = task.params.get("constraints").and_then(|v| v.as_array()) {
        spec.constraints = cons.iter().filter_map(|c| c.as_str()).map(str::to_string).collect();
    }
    spec.env_vars = task.environment.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    spec
}

/// Build the child-process plan for a task.
fn exec_plan_from(
    task: &Task,
    workspace: &std::path::Path,
    runtime: &hive_core::RuntimeHandle,
    grace_period: Duration,
) -> ExecPlan {
    let entry = if task.entry_point.is_empty() { "main.py" } else { &task.entry_point };
    let mut plan = ExecPlan::new(runtime.python_executable.to_string_lossy(), workspace)
        .arg(entry)
        .timeout(Duration::from_secs(task.timeout_s))
        .grace_period(grace_period);
    for (key, value) in &task.environment {
        plan = plan.env_var(key, value);
    }
    plan = plan.env_var("HIVE_RUN_ID", task.run_id.as_str());
    plan = plan.env_var("HIVE_TASK_ID", task.task_id.as_str());
    plan = plan.env_var("HIVE_PROJECT_ID", &task.project_id);
    plan
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

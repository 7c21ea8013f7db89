// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process execution with streaming output and bounded lifetime.

use crate::plan::{ExecPlan, ExecResult, ExecStatus, CANCELLED_EXIT_CODE, MAX_LINE_BYTES, TIMEOUT_EXIT_CODE};
use crate::sink::{LogSink, SeqCounter};
use crate::ExecError;
use hive_core::runtime::RuntimeHandle;
use hive_core::{LogEntry, LogStream, RunId};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Slot-limited subprocess executor.
///
/// `run` blocks on slot acquisition, so at most `max_concurrent` children
/// exist at any instant regardless of how many runs are queued.
pub struct ProcessExecutor {
    slots: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ProcessExecutor {
    pub fn new(max_concurrent: usize) -> Self {
        Self { slots: Arc::new(Semaphore::new(max_concurrent.max(1))), max_concurrent: max_concurrent.max(1) }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Slots not currently running a child.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run one child to completion.
    ///
    /// Every line of stdout/stderr becomes a [`LogEntry`] with a sequence
    /// from a fresh per-run counter. Timeout and cancellation both follow
    /// the polite-stop → grace → hard-kill sequence; the difference is
    /// only the reported status.
    pub async fn run(
        &self,
        run_id: RunId,
        plan: &ExecPlan,
        runtime: Option<&RuntimeHandle>,
        sink: Arc<dyn LogSink>,
        cancel: CancellationToken,
    ) -> Result<ExecResult, ExecError> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| ExecError::ShuttingDown)?;

        let started_at_ms = now_ms();
        let started = std::time::Instant::now();

        let mut command = self.build_command(plan, runtime);
        let mut child = command.spawn().map_err(|source| ExecError::SpawnFailed {
            command: plan.command.clone(),
            source,
        })?;

        debug!(run_id = %run_id, command = %plan.command, pid = ?child.id(), "spawned child");

        let seq = SeqCounter::new();
        let stdout_task = child
            .stdout
            .take()
            .map(|out| spawn_reader(out, run_id, LogStream::Stdout, seq.clone(), Arc::clone(&sink)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| spawn_reader(err, run_id, LogStream::Stderr, seq.clone(), Arc::clone(&sink)));

        let mut timed_out = false;
        let mut cancelled = false;

        let wait_result = tokio::select! {
            status = child.wait() => Some(status?),
            _ = cancel.cancelled() => {
                cancelled = true;
                None
            }
            _ = tokio::time::sleep(plan.timeout) => {
                timed_out = true;
                None
            }
        };

        let exit_status = match wait_result {
            Some(status) => Some(status),
            None => {
                // Polite stop, then hard kill after the grace period.
                let reason = if timed_out { "timeout" } else { "cancel" };
                emit_system(
                    &sink,
                    run_id,
                    &seq,
                    format!("stopping run: {reason} (grace {}s)", plan.grace_period.as_secs()),
                );
                polite_stop(&child);
                match tokio::time::timeout(plan.grace_period, child.wait()).await {
                    Ok(status) => Some(status?),
                    Err(_) => {
                        warn!(run_id = %run_id, "child survived grace period, sending hard kill");
                        child.kill().await?;
                        None
                    }
                }
            }
        };

        // Drain readers so every line is emitted before we report.
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let finished_at_ms = now_ms();
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = if timed_out {
            ExecResult {
                status: ExecStatus::TimedOut,
                exit_code: TIMEOUT_EXIT_CODE,
                started_at_ms,
                finished_at_ms,
                duration_ms,
                error_message: Some(format!(
                    "timed out after {}s",
                    plan.timeout.as_secs()
                )),
            }
        } else if cancelled {
            ExecResult {
                status: ExecStatus::Cancelled,
                exit_code: CANCELLED_EXIT_CODE,
                started_at_ms,
                finished_at_ms,
                duration_ms,
                error_message: Some("cancelled".to_string()),
            }
        } else {
            let exit_code = exit_status.and_then(|s| s.code()).unwrap_or(-1);
            if exit_code == 0 {
                ExecResult {
                    status: ExecStatus::Success,
                    exit_code,
                    started_at_ms,
                    finished_at_ms,
                    duration_ms,
                    error_message: None,
                }
            } else {
                ExecResult {
                    status: ExecStatus::Failed,
                    exit_code,
                    started_at_ms,
                    finished_at_ms,
                    duration_ms,
                    error_message: Some(format!("exited with code {exit_code}")),
                }
            }
        };

        debug!(
            run_id = %run_id,
            status = ?result.status,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "child finished"
        );
        Ok(result)
    }

    fn build_command(&self, plan: &ExecPlan, runtime: Option<&RuntimeHandle>) -> tokio::process::Command {
        let (program, prelude_args) = resource_wrapper(plan);

        let mut command = tokio::process::Command::new(&program);
        command.args(&prelude_args);
        if program != plan.command {
            command.arg(&plan.command);
        }
        command.args(&plan.args);
        command.current_dir(&plan.cwd);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        // Child env = worker env overlaid with the plan's, venv bin first
        // on PATH so the environment's interpreter and tools win.
        command.envs(std::env::vars());
        command.envs(&plan.env);
        if let Some(rt) = runtime {
            let bin = rt.bin_dir();
            let path = std::env::var("PATH").unwrap_or_default();
            command.env("PATH", format!("{}{}{}", bin.display(), PATH_SEP, path));
            command.env("VIRTUAL_ENV", &rt.path);
        }

        command
    }
}

#[cfg(windows)]
const PATH_SEP: &str = ";";
#[cfg(not(windows))]
const PATH_SEP: &str = ":";

/// Wrap the command in `prlimit` when limits are requested and the tool
/// exists; otherwise warn and run unconstrained.
fn resource_wrapper(plan: &ExecPlan) -> (String, Vec<String>) {
    if plan.cpu_limit_seconds.is_none() && plan.memory_limit_mb.is_none() {
        return (plan.command.clone(), Vec::new());
    }

    #[cfg(unix)]
    {
        if std::path::Path::new("/usr/bin/prlimit").exists() {
            let mut args = Vec::new();
            if let Some(cpu) = plan.cpu_limit_seconds {
                args.push(format!("--cpu={cpu}"));
            }
            if let Some(mem) = plan.memory_limit_mb {
                args.push(format!("--rss={}", mem * 1024 * 1024));
            }
            args.push("--".to_string());
            return ("/usr/bin/prlimit".to_string(), args);
        }
    }

    warn!(
        command = %plan.command,
        "resource limits requested but no platform support; continuing without"
    );
    (plan.command.clone(), Vec::new())
}

/// Ask the child to stop politely (SIGTERM on unix, hard kill elsewhere).
fn polite_stop(child: &tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
        return;
    }
    // Fallback: no separate polite signal available; the grace-period
    // timeout will escalate to kill().
}

fn spawn_reader<R>(
    reader: R,
    run_id: RunId,
    stream: LogStream,
    seq: SeqCounter,
    sink: Arc<dyn LogSink>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            for chunk in split_line(&line, MAX_LINE_BYTES) {
                sink.emit(LogEntry::new(run_id, stream, seq.next(), now_ms(), chunk));
            }
        }
    })
}

fn emit_system(sink: &Arc<dyn LogSink>, run_id: RunId, seq: &SeqCounter, message: String) {
    sink.emit(LogEntry::new(run_id, LogStream::System, seq.next(), now_ms(), message));
}

/// Split a line into chunks of at most `max` bytes on char boundaries.
/// Empty lines yield one empty chunk so blank output is preserved.
pub(crate) fn split_line(line: &str, max: usize) -> Vec<String> {
    if line.len() <= max {
        return vec![line.to_string()];
    }
    let mut chunks = Vec::new();
    let mut rest = line;
    while rest.len() > max {
        let mut end = max;
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // A single char wider than max cannot be split further.
            end = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        chunks.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    chunks.push(rest.to_string());
    chunks
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

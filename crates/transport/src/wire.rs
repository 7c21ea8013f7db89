// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flat string-map codec for Direct mode.
//!
//! Redis stream fields are flat `string → string` maps; nested values
//! (`params`, `environment`, `capabilities`, `data`) ride as JSON
//! strings. The Gateway proto mirrors the same field set, so these
//! names are the single wire vocabulary for both transports.

use crate::TransportError;
use hive_core::clock::{iso8601, parse_iso8601};
use hive_core::{
    ControlKind, ControlMessage, Heartbeat, LogEntry, LogStream, ProjectType, RunId, Task, TaskId,
    TaskResult, TaskStatus,
};
use std::collections::HashMap;

pub type FieldMap = HashMap<String, String>;

fn missing(field: &'static str) -> TransportError {
    TransportError::Protocol(format!("missing field {field:?}"))
}

fn bad(field: &'static str, value: &str) -> TransportError {
    TransportError::Protocol(format!("bad value for {field:?}: {value:?}"))
}

fn get<'a>(fields: &'a FieldMap, key: &'static str) -> Result<&'a str, TransportError> {
    fields.get(key).map(String::as_str).ok_or_else(|| missing(key))
}

fn get_or<'a>(fields: &'a FieldMap, key: &str, default: &'a str) -> &'a str {
    fields.get(key).map(String::as_str).unwrap_or(default)
}

// ── Task ────────────────────────────────────────────────────────────────

/// Encode a task for the ready stream.
pub fn encode_task(task: &Task) -> Result<FieldMap, TransportError> {
    let mut fields = FieldMap::new();
    fields.insert("task_id".into(), task.task_id.to_string());
    fields.insert("run_id".into(), task.run_id.to_string());
    fields.insert("project_id".into(), task.project_id.clone());
    fields.insert("project_type".into(), task.project_type.as_wire_str().into());
    fields.insert("priority".into(), task.priority.to_string());
    fields.insert("timeout".into(), task.timeout_s.to_string());
    fields.insert("download_url".into(), task.download_url.clone());
    fields.insert("file_hash".into(), task.file_hash.clone());
    fields.insert("entry_point".into(), task.entry_point.clone());
    fields.insert("is_compressed".into(), if task.is_compressed { "1" } else { "0" }.into());
    fields.insert(
        "params".into(),
        serde_json::to_string(&task.params).map_err(|e| TransportError::Protocol(e.to_string()))?,
    );
    fields.insert(
        "environment".into(),
        serde_json::to_string(&task.environment)
            .map_err(|e| TransportError::Protocol(e.to_string()))?,
    );
    Ok(fields)
}

/// Decode a task from ready-stream fields. `receipt` is attached by the
/// caller (it knows the stream key and msg id).
pub fn decode_task(fields: &FieldMap, receipt: String) -> Result<Task, TransportError> {
    let project_type_raw = get(fields, "project_type")?;
    let project_type = ProjectType::from_wire_str(project_type_raw)
        .ok_or_else(|| bad("project_type", project_type_raw))?;

    let priority_raw = get_or(fields, "priority", "5");
    let priority = priority_raw.parse().map_err(|_| bad("priority", priority_raw))?;

    let timeout_raw = get_or(fields, "timeout", "3600");
    let timeout_s = timeout_raw.parse().map_err(|_| bad("timeout", timeout_raw))?;

    let params = match fields.get("params") {
        Some(raw) if !raw.is_empty() => {
            serde_json::from_str(raw).map_err(|_| bad("params", raw))?
        }
        _ => HashMap::new(),
    };
    let environment = match fields.get("environment") {
        Some(raw) if !raw.is_empty() => {
            serde_json::from_str(raw).map_err(|_| bad("environment", raw))?
        }
        _ => HashMap::new(),
    };

    Ok(Task {
        task_id: TaskId::from_string(get(fields, "task_id")?),
        run_id: RunId::from_string(get(fields, "run_id")?),
        project_id: get(fields, "project_id")?.to_string(),
        project_type,
        priority,
        params,
        environment,
        timeout_s,
        download_url: get_or(fields, "download_url", "").to_string(),
        file_hash: get_or(fields, "file_hash", "").to_string(),
        entry_point: get_or(fields, "entry_point", "").to_string(),
        is_compressed: matches!(get_or(fields, "is_compressed", "0"), "1" | "true"),
        receipt,
    })
}

// ── Result ──────────────────────────────────────────────────────────────

pub fn encode_result(result: &TaskResult) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("run_id".into(), result.run_id.to_string());
    fields.insert("task_id".into(), result.task_id.to_string());
    fields.insert("status".into(), result.status.as_wire_str().into());
    fields.insert("exit_code".into(), result.exit_code.to_string());
    fields.insert("error_message".into(), result.error_message.clone());
    fields.insert("started_at".into(), iso8601(result.started_at_ms));
    fields.insert("finished_at".into(), iso8601(result.finished_at_ms));
    fields.insert("duration_ms".into(), result.duration_ms.to_string());
    if let Some(data) = &result.data {
        fields.insert("data".into(), data.to_string());
    }
    fields
}

pub fn decode_result(fields: &FieldMap) -> Result<TaskResult, TransportError> {
    let status_raw = get(fields, "status")?;
    let status =
        TaskStatus::from_wire_str(status_raw).ok_or_else(|| bad("status", status_raw))?;

    let exit_raw = get_or(fields, "exit_code", "0");
    let exit_code = exit_raw.parse().map_err(|_| bad("exit_code", exit_raw))?;

    let duration_raw = get_or(fields, "duration_ms", "0");
    let duration_ms = duration_raw.parse().map_err(|_| bad("duration_ms", duration_raw))?;

    let data = match fields.get("data") {
        Some(raw) if !raw.is_empty() => {
            Some(serde_json::from_str(raw).map_err(|_| bad("data", raw))?)
        }
        _ => None,
    };

    Ok(TaskResult {
        run_id: RunId::from_string(get(fields, "run_id")?),
        task_id: TaskId::from_string(get(fields, "task_id")?),
        status,
        exit_code,
        error_message: get_or(fields, "error_message", "").to_string(),
        started_at_ms: parse_iso8601(get_or(fields, "started_at", "")).unwrap_or(0),
        finished_at_ms: parse_iso8601(get_or(fields, "finished_at", "")).unwrap_or(0),
        duration_ms,
        data,
    })
}

// ── Logs ────────────────────────────────────────────────────────────────

pub fn encode_log_entry(entry: &LogEntry) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("log_type".into(), entry.stream.as_wire_str().into());
    fields.insert("content".into(), entry.content.clone());
    fields.insert("timestamp".into(), iso8601(entry.ts_ms));
    fields.insert("sequence".into(), entry.seq.to_string());
    if let Some(level) = &entry.level {
        fields.insert("level".into(), level.clone());
    }
    fields
}

pub fn decode_log_entry(run_id: RunId, fields: &FieldMap) -> Result<LogEntry, TransportError> {
    let stream_raw = get(fields, "log_type")?;
    let stream =
        LogStream::from_wire_str(stream_raw).ok_or_else(|| bad("log_type", stream_raw))?;
    let seq_raw = get(fields, "sequence")?;
    let seq = seq_raw.parse().map_err(|_| bad("sequence", seq_raw))?;
    Ok(LogEntry {
        run_id,
        stream,
        seq,
        ts_ms: parse_iso8601(get_or(fields, "timestamp", "")).unwrap_or(0),
        content: get_or(fields, "content", "").to_string(),
        level: fields.get("level").cloned(),
    })
}

// ── Heartbeat ───────────────────────────────────────────────────────────

pub fn encode_heartbeat(hb: &Heartbeat) -> Result<FieldMap, TransportError> {
    let mut fields = FieldMap::new();
    fields.insert("status".into(), hb.status.clone());
    fields.insert("cpu_percent".into(), format!("{:.1}", hb.metrics.cpu_percent));
    fields.insert("memory_percent".into(), format!("{:.1}", hb.metrics.memory_percent));
    fields.insert("disk_percent".into(), format!("{:.1}", hb.metrics.disk_percent));
    fields.insert("running_tasks".into(), hb.metrics.running_tasks.to_string());
    fields.insert("max_concurrent_tasks".into(), hb.metrics.max_concurrent_tasks.to_string());
    fields.insert("timestamp".into(), iso8601(hb.ts_ms));
    fields.insert("name".into(), hb.name.clone());
    fields.insert("host".into(), hb.host.clone());
    fields.insert("port".into(), hb.port.to_string());
    fields.insert("region".into(), hb.region.clone());
    fields.insert("version".into(), hb.version.clone());
    fields.insert("os_type".into(), hb.os_info.os_type.clone());
    fields.insert("os_version".into(), hb.os_info.os_version.clone());
    fields.insert("python_version".into(), hb.os_info.python_version.clone());
    fields.insert("machine_arch".into(), hb.os_info.machine_arch.clone());
    fields.insert(
        "capabilities".into(),
        serde_json::to_string(&hb.capabilities)
            .map_err(|e| TransportError::Protocol(e.to_string()))?,
    );
    if let Some(stats) = &hb.spider_stats {
        fields.insert(
            "spider_stats".into(),
            serde_json::to_string(stats).map_err(|e| TransportError::Protocol(e.to_string()))?,
        );
    }
    Ok(fields)
}

// ── Control ─────────────────────────────────────────────────────────────

pub fn encode_control(msg: &ControlMessage) -> Result<FieldMap, TransportError> {
    let mut fields = FieldMap::new();
    fields.insert("control_type".into(), msg.kind.as_wire_str().into());
    if let Some(task_id) = &msg.task_id {
        fields.insert("task_id".into(), task_id.clone());
    }
    if let Some(run_id) = &msg.run_id {
        fields.insert("run_id".into(), run_id.clone());
    }
    if let Some(payload) = &msg.payload {
        fields.insert("payload".into(), payload.to_string());
    }
    Ok(fields)
}

pub fn decode_control(fields: &FieldMap, receipt: String) -> Result<ControlMessage, TransportError> {
    let kind_raw = get(fields, "control_type")?;
    let kind =
        ControlKind::from_wire_str(kind_raw).ok_or_else(|| bad("control_type", kind_raw))?;
    let payload = match fields.get("payload") {
        Some(raw) if !raw.is_empty() => {
            Some(serde_json::from_str(raw).map_err(|_| bad("payload", raw))?)
        }
        _ => None,
    };
    Ok(ControlMessage {
        kind,
        task_id: fields.get("task_id").cloned(),
        run_id: fields.get("run_id").cloned(),
        payload,
        receipt,
    })
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;

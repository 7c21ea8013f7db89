// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_util::FakeTransport;
use hive_core::TaskStatus;
use tempfile::TempDir;

struct Fixture {
    _dirs: TempDir,
    transport: Arc<FakeTransport>,
    engine: Arc<Engine>,
}

/// Seed a fake "built" runtime whose python is a shell script, so runs
/// execute without any real interpreter or package manager.
fn seed_runtime(venvs: &std::path::Path, script: &str) {
    let spec = hive_core::RuntimeSpec::new("3");
    let hash = spec.runtime_hash();
    let root = venvs.join(&hash);
    let bin = root.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let python = bin.join("python");
    std::fs::write(&python, format!("#!/bin/sh\n{script}\n")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    let manifest = serde_json::json!({
        "runtime_hash": hash,
        "python_version": "3",
        "requirements": [],
        "constraints": [],
        "interpreter": "/bin/sh",
        "created_at": "2026-01-01T00:00:00.000Z",
        "packages_count": 0,
    });
    std::fs::write(root.join("manifest.json"), manifest.to_string()).unwrap();
}

fn fixture(script: &str) -> Fixture {
    let dirs = tempfile::tempdir().unwrap();
    let root = dirs.path();
    seed_runtime(&root.join("runtimes"), script);

    let transport = Arc::new(FakeTransport::new());
    let config = EngineConfig {
        max_concurrent: 2,
        max_queue_size: 8,
        poll_timeout: Duration::from_millis(50),
        control_poll_timeout: Duration::from_millis(50),
        grace_period: Duration::from_millis(500),
        wal_dir: root.join("logs/wal"),
        spool_dir: root.join("logs/spool"),
        runs_dir: root.join("runs"),
        archive: None,
    };
    let deps = EngineDeps {
        transport: Arc::clone(&transport) as Arc<dyn Transport>,
        resolver: Arc::new(RuntimeResolver::new(root.join("runtimes"))),
        executor: Arc::new(ProcessExecutor::new(2)),
        artifacts: Arc::new(ArtifactStore::new(root.join("projects"))),
    };
    Fixture { _dirs: dirs, transport, engine: Arc::new(Engine::new(config, deps)) }
}

fn test_task(timeout_s: u64) -> Task {
    let mut task = Task::builder().build();
    task.timeout_s = timeout_s;
    task.receipt = format!("ready|{}", task.run_id);
    task
}

async fn wait_for<F: Fn() -> bool>(timeout: Duration, predicate: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    predicate()
}

#[tokio::test]
async fn executes_a_task_end_to_end() {
    let fx = fixture("echo Hello");
    let task = test_task(30);
    let receipt = task.receipt.clone();
    fx.transport.queue_task(task);

    let cancel = CancellationToken::new();
    let engine = Arc::clone(&fx.engine);
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel).await });

    assert!(
        wait_for(Duration::from_secs(10), || !fx.transport.results.lock().is_empty()).await,
        "result should be reported"
    );
    cancel.cancel();
    handle.await.unwrap();

    let results = fx.transport.results.lock().clone();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, TaskStatus::Success);
    assert_eq!(results[0].exit_code, 0);

    // Acked accepted=true only after the result was reported.
    let acks = fx.transport.acks.lock().clone();
    assert_eq!(acks, vec![(receipt, true, String::new())]);

    // Logs flowed through the pipeline to the transport.
    let logs = fx.transport.logs.lock();
    assert!(logs.iter().any(|e| e.content == "Hello"));
}

#[tokio::test]
async fn runtime_resolution_failure_reports_failed_and_acks() {
    let fx = fixture("echo unused");
    let mut task = test_task(30);
    task.params.insert("python_version".into(), serde_json::json!("99.99"));
    task.receipt = "ready|rfail".into();
    fx.transport.queue_task(task);

    let cancel = CancellationToken::new();
    let engine = Arc::clone(&fx.engine);
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel).await });

    assert!(
        wait_for(Duration::from_secs(10), || !fx.transport.results.lock().is_empty()).await
    );
    cancel.cancel();
    handle.await.unwrap();

    let results = fx.transport.results.lock().clone();
    assert_eq!(results[0].status, TaskStatus::Failed);
    assert!(results[0].error_message.contains("interpreter"));
    assert_eq!(fx.transport.accepted_acks(), 1);
}

#[tokio::test]
async fn timeout_reports_timeout_status() {
    let fx = fixture("sleep 60");
    let task = test_task(1); // 1s timeout
    fx.transport.queue_task(task);

    let cancel = CancellationToken::new();
    let engine = Arc::clone(&fx.engine);
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel).await });

    assert!(
        wait_for(Duration::from_secs(15), || !fx.transport.results.lock().is_empty()).await
    );
    cancel.cancel();
    handle.await.unwrap();

    let results = fx.transport.results.lock().clone();
    assert_eq!(results[0].status, TaskStatus::Timeout);
    assert_eq!(results[0].exit_code, 124);
}

#[tokio::test]
async fn control_cancel_stops_a_running_task() {
    let fx = fixture("sleep 60");
    let task = test_task(300);
    let run_id = task.run_id;
    fx.transport.queue_task(task);

    let cancel = CancellationToken::new();
    let engine = Arc::clone(&fx.engine);
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel).await });

    // Wait until the run is live, then cancel it via the control plane.
    assert!(
        wait_for(Duration::from_secs(10), || fx.engine.states().running_count() > 0).await,
        "run should reach Running"
    );
    let mut control = hive_core::ControlMessage::cancel(run_id.as_str());
    control.receipt = "ctrl|1-0".into();
    fx.transport.queue_control(control);

    assert!(
        wait_for(Duration::from_secs(10), || !fx.transport.results.lock().is_empty()).await,
        "cancelled result should be reported"
    );
    cancel.cancel();
    handle.await.unwrap();

    let results = fx.transport.results.lock().clone();
    assert_eq!(results[0].status, TaskStatus::Cancelled);
    assert_eq!(fx.transport.control_acks.lock().clone(), vec!["ctrl|1-0".to_string()]);
}

#[tokio::test]
async fn duplicate_deliveries_are_ignored_while_active() {
    let fx = fixture("sleep 2");
    let task = test_task(30);
    let dup = task.clone();
    fx.transport.queue_task(task);
    fx.transport.queue_task(dup);

    let cancel = CancellationToken::new();
    let engine = Arc::clone(&fx.engine);
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel).await });

    assert!(
        wait_for(Duration::from_secs(15), || !fx.transport.results.lock().is_empty()).await
    );
    cancel.cancel();
    handle.await.unwrap();

    // Exactly one result despite two deliveries of the same run.
    assert_eq!(fx.transport.results.lock().len(), 1);
}

#[tokio::test]
async fn runtime_manage_control_reports_environments() {
    let fx = fixture("echo unused");
    let control = hive_core::ControlMessage {
        kind: hive_core::ControlKind::RuntimeManage,
        task_id: Some("ctl-9".into()),
        run_id: None,
        payload: Some(serde_json::json!({"action": "list"})),
        receipt: "ctrl|2-0".into(),
    };
    fx.transport.queue_control(control);

    let cancel = CancellationToken::new();
    let engine = Arc::clone(&fx.engine);
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel).await });

    assert!(
        wait_for(Duration::from_secs(5), || !fx.transport.control_results.lock().is_empty())
            .await
    );
    cancel.cancel();
    handle.await.unwrap();

    let replies = fx.transport.control_results.lock().clone();
    assert_eq!(replies[0].0, "ctl-9");
    assert_eq!(replies[0].1["ok"], serde_json::json!(true));
}

#[tokio::test]
async fn config_update_swaps_settings_atomically() {
    let fx = fixture("echo unused");
    let control = hive_core::ControlMessage {
        kind: hive_core::ControlKind::ConfigUpdate,
        task_id: None,
        run_id: None,
        payload: Some(serde_json::json!({"poll_timeout_s": 9, "grace_period_s": 33})),
        receipt: String::new(),
    };
    fx.transport.queue_control(control);

    let cancel = CancellationToken::new();
    let engine = Arc::clone(&fx.engine);
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel).await });

    assert!(
        wait_for(Duration::from_secs(5), || {
            fx.engine.settings().poll_timeout == Duration::from_secs(9)
        })
        .await
    );
    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(fx.engine.settings().grace_period, Duration::from_secs(33));
}

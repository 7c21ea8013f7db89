// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hive_core::WorkerMetrics;

fn config() -> RegistryConfig {
    RegistryConfig {
        heartbeat_ttl: Duration::from_millis(300),
        offline_threshold: Duration::from_millis(300),
        max_offline_time: Duration::from_millis(1000),
        cleanup_interval: Duration::from_millis(50),
    }
}

fn heartbeat(worker_id: &str, ts_ms: u64, running: u32) -> Heartbeat {
    Heartbeat {
        worker_id: WorkerId::new(worker_id),
        status: "running".into(),
        metrics: WorkerMetrics { running_tasks: running, ..WorkerMetrics::default() },
        os_info: Default::default(),
        capabilities: Default::default(),
        spider_stats: None,
        ts_ms,
        name: worker_id.into(),
        host: "127.0.0.1".into(),
        port: 8900,
        region: String::new(),
        version: "0.2.0".into(),
    }
}

#[tokio::test]
async fn register_and_get() {
    let registry = MemoryRegistry::new(config());
    let info = WorkerInfo::new(WorkerId::new("w1"), 1_000);
    registry.register(info.clone()).await.unwrap();

    let fetched = registry.get(&WorkerId::new("w1")).await.unwrap().unwrap();
    assert_eq!(fetched, info);
}

#[tokio::test]
async fn re_registration_is_idempotent() {
    let registry = MemoryRegistry::new(config());
    let info = WorkerInfo::new(WorkerId::new("w1"), 1_000);
    registry.register(info.clone()).await.unwrap();
    registry.register(info).await.unwrap();
    assert_eq!(registry.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn heartbeat_upserts_and_bumps_counters() {
    let registry = MemoryRegistry::new(config());
    // No prior registration: heartbeat creates the record.
    registry.heartbeat(&heartbeat("w1", 2_000, 3), 2_000).await.unwrap();

    let info = registry.get(&WorkerId::new("w1")).await.unwrap().unwrap();
    assert_eq!(info.status, WorkerStatus::Online);
    assert_eq!(info.last_heartbeat_ms, 2_000);
    assert_eq!(info.active_tasks, 3);
}

#[tokio::test]
async fn stale_heartbeats_lose_last_writer_wins() {
    let registry = MemoryRegistry::new(config());
    registry.heartbeat(&heartbeat("w1", 5_000, 5), 5_000).await.unwrap();
    registry.heartbeat(&heartbeat("w1", 4_000, 9), 5_100).await.unwrap();

    let info = registry.get(&WorkerId::new("w1")).await.unwrap().unwrap();
    assert_eq!(info.last_heartbeat_ms, 5_000);
    assert_eq!(info.active_tasks, 5);
}

#[tokio::test]
async fn sweep_marks_stale_workers_offline() {
    let registry = MemoryRegistry::new(config());
    registry.heartbeat(&heartbeat("w1", 1_000, 0), 1_000).await.unwrap();

    // Within the TTL window: still online.
    let (marked, _) = registry.sweep(1_100).await.unwrap();
    assert_eq!(marked, 0);

    // Past the liveness window: offline.
    let (marked, evicted) = registry.sweep(1_500).await.unwrap();
    assert_eq!(marked, 1);
    assert_eq!(evicted, 0);
    let info = registry.get(&WorkerId::new("w1")).await.unwrap().unwrap();
    assert_eq!(info.status, WorkerStatus::Offline);
}

#[tokio::test]
async fn long_offline_workers_are_evicted() {
    let registry = MemoryRegistry::new(config());
    registry.heartbeat(&heartbeat("w1", 1_000, 0), 1_000).await.unwrap();

    registry.sweep(1_500).await.unwrap(); // offline at 1_500
    let (_, evicted) = registry.sweep(2_600).await.unwrap(); // 1.1s offline > 1s max
    assert_eq!(evicted, 1);
    assert!(registry.get(&WorkerId::new("w1")).await.unwrap().is_none());
}

#[tokio::test]
async fn fresh_heartbeat_revives_offline_worker() {
    let registry = MemoryRegistry::new(config());
    registry.heartbeat(&heartbeat("w1", 1_000, 0), 1_000).await.unwrap();
    registry.sweep(1_500).await.unwrap();

    registry.heartbeat(&heartbeat("w1", 1_600, 1), 1_600).await.unwrap();
    let info = registry.get(&WorkerId::new("w1")).await.unwrap().unwrap();
    assert_eq!(info.status, WorkerStatus::Online);

    // And it is no longer a sweep candidate.
    let (marked, evicted) = registry.sweep(1_700).await.unwrap();
    assert_eq!((marked, evicted), (0, 0));
}

#[tokio::test]
async fn batch_membership_follows_registration() {
    let registry = MemoryRegistry::new(config());
    let mut info = WorkerInfo::new(WorkerId::new("w1"), 1_000);
    info.batch_id = Some("batch-9".into());
    registry.register(info).await.unwrap();

    let members = registry.batch_members("batch-9").await.unwrap();
    assert_eq!(members, vec![WorkerId::new("w1")]);

    registry.remove(&WorkerId::new("w1")).await.unwrap();
    assert!(registry.batch_members("batch-9").await.unwrap().is_empty());
}

#[tokio::test]
async fn online_filters_by_status() {
    let registry = MemoryRegistry::new(config());
    registry.heartbeat(&heartbeat("w1", 1_000, 0), 1_000).await.unwrap();
    registry.heartbeat(&heartbeat("w2", 1_000, 0), 1_000).await.unwrap();
    registry.sweep(1_500).await.unwrap(); // both offline
    registry.heartbeat(&heartbeat("w2", 1_600, 0), 1_600).await.unwrap();

    let online = registry.online().await.unwrap();
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].worker_id, WorkerId::new("w2"));
}

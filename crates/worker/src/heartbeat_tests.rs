// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_util::FakeTransport;
use std::sync::atomic::Ordering;

struct StaticMetrics;

impl MetricsSource for StaticMetrics {
    fn metrics(&self) -> WorkerMetrics {
        WorkerMetrics {
            cpu_percent: 10.0,
            memory_percent: 20.0,
            disk_percent: 30.0,
            running_tasks: 1,
            max_concurrent_tasks: 4,
        }
    }
}

fn reporter(transport: Arc<FakeTransport>) -> HeartbeatReporter {
    let config = ReporterConfig {
        interval: Duration::from_millis(50),
        min_interval: Duration::from_millis(5),
        degraded_interval: Duration::from_millis(100),
        max_consecutive_failures: 3,
        reconnect_backoff: Backoff {
            base: Duration::from_millis(5),
            cap: Duration::from_millis(20),
            jitter: 0.0,
        },
    };
    HeartbeatReporter::new(
        WorkerId::new("w1"),
        transport,
        Arc::new(StaticMetrics),
        config,
        HeartbeatIdentity {
            name: "worker-1".into(),
            host: "127.0.0.1".into(),
            port: 8900,
            region: "local".into(),
        },
        CapabilityMap::new(),
    )
}

#[tokio::test]
async fn successful_beat_reports_metrics_and_identity() {
    let transport = Arc::new(FakeTransport::new());
    let reporter = reporter(Arc::clone(&transport));

    let delay = reporter.beat_once().await;
    assert_eq!(delay, Duration::from_millis(50));
    assert_eq!(reporter.state(), ReporterState::Running);

    let heartbeats = transport.heartbeats.lock();
    assert_eq!(heartbeats.len(), 1);
    let hb = &heartbeats[0];
    assert_eq!(hb.worker_id, WorkerId::new("w1"));
    assert_eq!(hb.status, "running");
    assert_eq!(hb.metrics.running_tasks, 1);
    assert_eq!(hb.name, "worker-1");
    assert_eq!(hb.port, 8900);
}

#[tokio::test]
async fn failures_shorten_interval_for_fast_retry() {
    let transport = Arc::new(FakeTransport::new());
    transport.fail_heartbeats.store(true, Ordering::SeqCst);
    let reporter = reporter(Arc::clone(&transport));

    let delay = reporter.beat_once().await;
    assert_eq!(delay, Duration::from_millis(5));
    assert_eq!(reporter.consecutive_failures(), 1);
    assert_eq!(reporter.state(), ReporterState::Running);
}

#[tokio::test]
async fn sustained_failure_degrades_and_triggers_reconnect() {
    let transport = Arc::new(FakeTransport::new());
    transport.fail_heartbeats.store(true, Ordering::SeqCst);
    let reporter = reporter(Arc::clone(&transport));

    let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let fired_clone = Arc::clone(&fired);
    reporter.on_disconnect(Box::new(move || {
        fired_clone.store(true, Ordering::SeqCst);
    }));

    // Third consecutive failure crosses the threshold.
    reporter.beat_once().await;
    reporter.beat_once().await;
    let delay = reporter.beat_once().await;

    assert_eq!(reporter.state(), ReporterState::Degraded);
    assert_eq!(delay, Duration::from_millis(100));
    assert!(fired.load(Ordering::SeqCst));
    // The reconnect hook ran (and in the fake, healed the outage).
    assert!(transport.reconnects.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn success_after_degraded_restores_running() {
    let transport = Arc::new(FakeTransport::new());
    transport.fail_heartbeats.store(true, Ordering::SeqCst);
    let reporter = reporter(Arc::clone(&transport));

    for _ in 0..3 {
        reporter.beat_once().await;
    }
    assert_eq!(reporter.state(), ReporterState::Degraded);

    // Fake reconnect cleared the failure flag; the next beat recovers.
    let delay = reporter.beat_once().await;
    assert_eq!(reporter.state(), ReporterState::Running);
    assert_eq!(reporter.consecutive_failures(), 0);
    assert_eq!(delay, Duration::from_millis(50));
}

#[tokio::test]
async fn degraded_status_is_visible_on_the_wire() {
    let transport = Arc::new(FakeTransport::new());
    transport.fail_heartbeats.store(true, Ordering::SeqCst);
    let reporter = reporter(Arc::clone(&transport));
    for _ in 0..3 {
        reporter.beat_once().await;
    }
    // reconnect healed the fake; this beat carries degraded status.
    reporter.beat_once().await;
    let heartbeats = transport.heartbeats.lock();
    assert_eq!(heartbeats.last().map(|h| h.status.as_str()), Some("degraded"));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::backend::MemoryBackend;
use hive_core::CrawlTask;

fn service(max_retries: u32) -> CrawlQueueService {
    CrawlQueueService::new(
        Arc::new(MemoryBackend::new()),
        QueueConfig { max_retries, min_idle: Duration::ZERO, ..QueueConfig::default() },
    )
}

fn task(url: &str) -> CrawlTask {
    CrawlTask::seed(url, "b1", 1_000)
}

#[tokio::test]
async fn enqueue_dedups_by_url() {
    let service = service(3);
    service.ensure_queues("p1").await.unwrap();

    let report = service
        .enqueue_urls(
            "p1",
            vec![task("https://a/"), task("https://b/"), task("https://a/")],
            Priority::Normal,
            false,
        )
        .await
        .unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.enqueued, 2);
    assert_eq!(report.duplicate, 1);
    assert_eq!(report.msg_ids.len(), 2);
}

#[tokio::test]
async fn skip_dedup_enqueues_everything_and_records_urls() {
    let service = service(3);
    let report = service
        .enqueue_urls("p1", vec![task("https://seed/")], Priority::High, true)
        .await
        .unwrap();
    assert_eq!(report.enqueued, 1);

    // Seed was recorded: later organic discovery of it is a duplicate.
    let report = service
        .enqueue_urls("p1", vec![task("https://seed/")], Priority::Normal, false)
        .await
        .unwrap();
    assert_eq!(report.duplicate, 1);
    assert_eq!(report.enqueued, 0);
}

#[tokio::test]
async fn retry_re_enqueues_at_original_priority_until_budget() {
    let service = service(2);
    service.enqueue_urls("p1", vec![task("https://a/")], Priority::Low, true).await.unwrap();

    // retry 1 and 2 re-enqueue; retry 3 (> max_retries=2) dead-letters
    for expected_requeue in [true, true, false] {
        let delivery = service.fetch("p1", Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(delivery.priority, Priority::Low);
        let requeued = service.retry("p1", &delivery, "fetch failed").await.unwrap();
        assert_eq!(requeued, expected_requeue);
    }

    let stats = service.stats("p1").await.unwrap();
    assert_eq!(stats.dead_letter, 1);
    assert_eq!(stats.low, 0);
}

#[tokio::test]
async fn reclaim_moves_over_budget_deliveries_to_dead_letter() {
    let service = service(2);
    service.enqueue_urls("p1", vec![task("https://a/")], Priority::Normal, true).await.unwrap();

    // Deliver and abandon repeatedly; delivery_count grows by one per
    // reclaim. Boundary: count == max_retries stays live, > dead-letters.
    service.fetch("p1", Duration::from_millis(10)).await.unwrap().unwrap(); // count 1

    let live = service.reclaim_once("p1").await.unwrap(); // count 2 == max → live
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].delivery_count, 2);

    let live = service.reclaim_once("p1").await.unwrap(); // count 3 > max → dead
    assert!(live.is_empty());
    assert_eq!(service.stats("p1").await.unwrap().dead_letter, 1);
}

#[tokio::test]
async fn fetch_advances_tasks_to_dispatched() {
    let service = service(3);
    service.enqueue_urls("p1", vec![task("https://a/")], Priority::Normal, true).await.unwrap();
    let delivery = service.fetch("p1", Duration::from_millis(10)).await.unwrap().unwrap();
    assert_eq!(delivery.task.status, CrawlTaskStatus::Dispatched);
}

#[test]
fn advance_status_rejects_illegal_moves() {
    let mut t = task("https://a/");
    assert!(advance_status(&mut t, CrawlTaskStatus::Running).is_err());
    assert_eq!(t.status, CrawlTaskStatus::Pending);

    advance_status(&mut t, CrawlTaskStatus::Dispatched).unwrap();
    advance_status(&mut t, CrawlTaskStatus::Running).unwrap();
    advance_status(&mut t, CrawlTaskStatus::Success).unwrap();
    assert!(advance_status(&mut t, CrawlTaskStatus::Retry).is_err());
}

#[tokio::test]
async fn purge_clears_queues_and_dedup() {
    let service = service(3);
    service.enqueue_urls("p1", vec![task("https://a/")], Priority::Normal, false).await.unwrap();
    service.purge("p1").await.unwrap();

    let stats = service.stats("p1").await.unwrap();
    assert_eq!(stats.normal, 0);
    assert_eq!(stats.deduped, 0);

    // After purge the same URL enqueues again.
    let report = service
        .enqueue_urls("p1", vec![task("https://a/")], Priority::Normal, false)
        .await
        .unwrap();
    assert_eq!(report.enqueued, 1);
}

#[tokio::test]
async fn stats_count_per_priority() {
    let service = service(3);
    service.enqueue_urls("p1", vec![task("https://h/")], Priority::High, true).await.unwrap();
    service
        .enqueue_urls("p1", vec![task("https://n1/"), task("https://n2/")], Priority::Normal, true)
        .await
        .unwrap();

    let stats = service.stats("p1").await.unwrap();
    assert_eq!(stats.high, 1);
    assert_eq!(stats.normal, 2);
    assert_eq!(stats.low, 0);
}

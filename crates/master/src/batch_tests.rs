// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::backend::MemoryBackend;
use crate::queue::QueueConfig;

fn service() -> BatchService {
    let queue = Arc::new(CrawlQueueService::new(
        Arc::new(MemoryBackend::new()),
        QueueConfig::default(),
    ));
    BatchService::new(queue)
}

fn seeds() -> Vec<String> {
    vec!["https://a/".into(), "https://b/".into()]
}

#[tokio::test]
async fn start_injects_seeds_and_initializes_progress() {
    let service = service();
    let batch = service.create("p1", seeds(), BatchConfig::default(), false, 1_000);

    let started = service.start(&batch.batch_id, 2_000).await.unwrap();
    assert_eq!(started.status, BatchStatus::Running);
    assert_eq!(started.started_at_ms, Some(2_000));
    assert_eq!(started.progress.total, 2);
}

#[tokio::test]
async fn start_requires_pending() {
    let service = service();
    let batch = service.create("p1", seeds(), BatchConfig::default(), false, 1_000);
    service.start(&batch.batch_id, 2_000).await.unwrap();

    let err = service.start(&batch.batch_id, 3_000).await.unwrap_err();
    assert!(matches!(err, MasterError::InvalidBatchTransition { .. }));
}

#[tokio::test]
async fn pause_checkpoints_and_resume_restores() {
    let service = service();
    let batch = service.create("p1", seeds(), BatchConfig::default(), false, 1_000);
    service.start(&batch.batch_id, 2_000).await.unwrap();

    let progress = BatchProgress { total: 2, succeeded: 1, failed: 0, in_flight: 1 };
    let paused = service.pause(&batch.batch_id, progress.clone()).unwrap();
    assert_eq!(paused.status, BatchStatus::Paused);
    assert_eq!(paused.progress, progress);

    let resumed = service.resume(&batch.batch_id).unwrap();
    assert_eq!(resumed.status, BatchStatus::Running);
    assert_eq!(resumed.progress, progress);
}

#[tokio::test]
async fn cancel_from_any_non_terminal_state() {
    let service = service();

    let pending = service.create("p1", seeds(), BatchConfig::default(), false, 1_000);
    service.cancel(&pending.batch_id, false, 1_500).await.unwrap();

    let running = service.create("p2", seeds(), BatchConfig::default(), false, 1_000);
    service.start(&running.batch_id, 2_000).await.unwrap();
    let cancelled = service.cancel(&running.batch_id, false, 2_500).await.unwrap();
    assert_eq!(cancelled.status, BatchStatus::Cancelled);
    assert_eq!(cancelled.completed_at_ms, Some(2_500));
}

#[tokio::test]
async fn cancel_with_purge_clears_queue_and_progress() {
    let service = service();
    let batch = service.create("p1", seeds(), BatchConfig::default(), false, 1_000);
    service.start(&batch.batch_id, 2_000).await.unwrap();

    let cancelled = service.cancel(&batch.batch_id, true, 3_000).await.unwrap();
    assert_eq!(cancelled.progress, BatchProgress::default());
}

#[tokio::test]
async fn terminal_states_are_absorbing() {
    let service = service();
    let batch = service.create("p1", seeds(), BatchConfig::default(), false, 1_000);
    service.start(&batch.batch_id, 2_000).await.unwrap();
    service
        .complete(&batch.batch_id, true, BatchProgress::default(), 3_000)
        .unwrap();

    assert!(service.resume(&batch.batch_id).is_err());
    assert!(service.cancel(&batch.batch_id, false, 4_000).await.is_err());
    assert!(service
        .complete(&batch.batch_id, false, BatchProgress::default(), 5_000)
        .is_err());
    assert_eq!(service.get(&batch.batch_id).unwrap().status, BatchStatus::Completed);
}

#[tokio::test]
async fn complete_failed_records_failed_status() {
    let service = service();
    let batch = service.create("p1", seeds(), BatchConfig::default(), false, 1_000);
    service.start(&batch.batch_id, 2_000).await.unwrap();
    let failed = service
        .complete(&batch.batch_id, false, BatchProgress::default(), 3_000)
        .unwrap();
    assert_eq!(failed.status, BatchStatus::Failed);
}

#[tokio::test]
async fn update_progress_mutates_counters() {
    let service = service();
    let batch = service.create("p1", seeds(), BatchConfig::default(), false, 1_000);
    service.start(&batch.batch_id, 2_000).await.unwrap();

    let progress = service
        .update_progress(&batch.batch_id, |p| p.succeeded += 1)
        .unwrap();
    assert_eq!(progress.succeeded, 1);
}

#[tokio::test]
async fn test_batches_are_capped_and_cleaned_up() {
    let service = service();
    let config = BatchConfig { max_depth: 99, max_pages: 1_000_000, ..BatchConfig::default() };
    let batch = service.create("p1", seeds(), config, true, 1_000);
    assert!(batch.is_test);
    assert_eq!(batch.config.max_depth, 3);
    assert_eq!(batch.config.max_pages, 100);

    service.start(&batch.batch_id, 2_000).await.unwrap();
    service
        .complete(&batch.batch_id, true, BatchProgress::default(), 3_000)
        .unwrap();

    assert!(service.cleanup_test_batch(&batch.batch_id).await.unwrap());
    assert!(service.get(&batch.batch_id).is_err());
}

#[tokio::test]
async fn cleanup_refuses_non_test_or_active_batches() {
    let service = service();
    let normal = service.create("p1", seeds(), BatchConfig::default(), false, 1_000);
    service.start(&normal.batch_id, 2_000).await.unwrap();
    service.complete(&normal.batch_id, true, BatchProgress::default(), 3_000).unwrap();
    assert!(!service.cleanup_test_batch(&normal.batch_id).await.unwrap());

    let test = service.create("p2", seeds(), BatchConfig::default(), true, 1_000);
    service.start(&test.batch_id, 2_000).await.unwrap();
    // Still running: not eligible.
    assert!(!service.cleanup_test_batch(&test.batch_id).await.unwrap());
}

#[tokio::test]
async fn unknown_batch_is_an_error() {
    let service = service();
    let ghost = BatchId::new();
    assert!(matches!(service.get(&ghost), Err(MasterError::BatchNotFound(_))));
    assert!(service.resume(&ghost).is_err());
}

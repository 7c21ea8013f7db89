// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded priority scheduler.
//!
//! Min-heap ordered by `(priority, enqueue_seq)`: lower priority value
//! first, FIFO among equals. The bound is enforced on enqueue; overflow
//! is an explicit error so the poll loop can requeue the delivery
//! instead of silently buffering unbounded work.

use crate::EngineError;
use hive_core::Task;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::sync::Notify;

struct QueuedTask {
    priority: i32,
    seq: u64,
    task: Task,
}

// BinaryHeap is a max-heap; reverse the ordering to pop lowest
// (priority, seq) first.
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

struct Inner {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

/// Concurrency-safe bounded priority queue of tasks.
pub struct Scheduler {
    inner: Mutex<Inner>,
    notify: Notify,
    max_size: usize,
}

impl Scheduler {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner { heap: BinaryHeap::new(), next_seq: 0 }),
            notify: Notify::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Enqueue a task at its priority. Fails without mutating the queue
    /// when the bound is reached.
    pub fn enqueue(&self, task: Task) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.heap.len() >= self.max_size {
            return Err(EngineError::QueueFull { capacity: self.max_size });
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(QueuedTask { priority: task.priority, seq, task });
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Pop the highest-priority task, waiting up to `timeout` for one
    /// to arrive. Returns `None` on timeout.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Task> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(queued) = self.inner.lock().heap.pop() {
                return Some(queued.task);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    /// Non-blocking pop.
    pub fn try_dequeue(&self) -> Option<Task> {
        self.inner.lock().heap.pop().map(|q| q.task)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

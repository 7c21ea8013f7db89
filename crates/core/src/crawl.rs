// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawl task entity, priority levels, and the crawl-side status machine.
//!
//! Distinct from the worker-side run FSM in [`crate::run`]: a crawl task
//! tracks queue-level lifecycle (dispatch, retry, dead-letter), not the
//! mechanics of one execution attempt.

use serde::{Deserialize, Serialize};

/// Queue priority. Lower numeric value = higher priority on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

crate::wire_enum! {
    Priority {
        High => "high",
        Normal => "normal",
        Low => "low",
    }
}

impl Priority {
    /// Dequeue order: HIGH first, then NORMAL, then LOW.
    pub const ORDERED: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    /// Numeric wire value (lower = higher priority).
    pub fn as_int(&self) -> i32 {
        match self {
            Priority::High => 0,
            Priority::Normal => 5,
            Priority::Low => 9,
        }
    }

    /// Bucket an arbitrary numeric priority into a level.
    pub fn from_int(n: i32) -> Self {
        match n {
            i32::MIN..=2 => Priority::High,
            3..=7 => Priority::Normal,
            _ => Priority::Low,
        }
    }
}

/// Queue-level status of a crawl task.
///
/// ```text
/// Pending → Dispatched → Running → Success
///                               ↘ Retry → Dispatched   (≤ max_retries)
///                               ↘ Timeout → Dispatched | Failed
///                               ↘ Failed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlTaskStatus {
    #[default]
    Pending,
    Dispatched,
    Running,
    Success,
    Retry,
    Timeout,
    Failed,
}

crate::wire_enum! {
    CrawlTaskStatus {
        Pending => "pending",
        Dispatched => "dispatched",
        Running => "running",
        Success => "success",
        Retry => "retry",
        Timeout => "timeout",
        Failed => "failed",
    }
}

impl CrawlTaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlTaskStatus::Success | CrawlTaskStatus::Failed)
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition(&self, to: CrawlTaskStatus) -> bool {
        use CrawlTaskStatus::*;
        match (self, to) {
            (Pending, Dispatched) => true,
            (Dispatched, Running) => true,
            (Running, Success) => true,
            (Running, Retry) => true,
            (Running, Timeout) => true,
            (Running, Failed) => true,
            (Retry, Dispatched) => true,
            (Timeout, Dispatched) => true,
            (Timeout, Failed) => true,
            _ => false,
        }
    }
}

/// One crawl unit: a URL to fetch within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlTask {
    pub url: String,
    pub batch_id: String,
    pub depth: u32,
    pub priority: Priority,
    #[serde(default)]
    pub status: CrawlTaskStatus,
    #[serde(default)]
    pub retry_count: u32,
    /// Epoch ms when first enqueued.
    pub enqueued_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_url: Option<String>,
}

impl CrawlTask {
    pub fn seed(url: impl Into<String>, batch_id: impl Into<String>, now_ms: u64) -> Self {
        Self {
            url: url.into(),
            batch_id: batch_id.into(),
            depth: 0,
            priority: Priority::High,
            status: CrawlTaskStatus::Pending,
            retry_count: 0,
            enqueued_at_ms: now_ms,
            parent_url: None,
        }
    }

    /// Copy of this task with the retry counter bumped and the status
    /// moved to Retry (legal only from Running/Timeout; callers on
    /// other paths set status explicitly).
    pub fn with_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            status: CrawlTaskStatus::Retry,
            ..self.clone()
        }
    }
}

#[cfg(test)]
#[path = "crawl_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hive-core: shared types for the Hive distributed task execution system.
//!
//! Everything on the wire or shared between the worker and master sides
//! lives here: identifiers, status machines, wire entities, the runtime
//! environment model, and the clock abstraction.

pub mod macros;

pub mod batch;
pub mod capability;
pub mod clock;
pub mod control;
pub mod crawl;
pub mod heartbeat;
pub mod id;
pub mod log;
pub mod run;
pub mod runtime;
pub mod task;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use batch::{BatchConfig, BatchProgress, BatchStatus, CrawlBatch};
#[cfg(any(test, feature = "test-support"))]
pub use batch::CrawlBatchBuilder;
pub use capability::{Capability, CapabilityMap};
pub use clock::{Clock, FakeClock, SystemClock};
pub use control::{ControlKind, ControlMessage};
pub use crawl::{CrawlTask, CrawlTaskStatus, Priority};
pub use heartbeat::{Heartbeat, OsInfo, SpiderStats, WorkerMetrics};
pub use id::{BatchId, RunId, TaskId};
pub use log::{LogEntry, LogStream};
pub use run::{RunContext, RunState};
pub use runtime::{RuntimeHandle, RuntimeSpec};
pub use task::{ProjectType, Task, TaskResult, TaskStatus};
pub use worker::{WorkerId, WorkerInfo, WorkerStatus};

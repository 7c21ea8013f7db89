// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane messages pushed from the master to workers.

use serde::{Deserialize, Serialize};

/// What a control message asks the worker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// Cooperative cancel of one run (polite stop, then hard kill).
    Cancel,
    /// Immediate hard kill of one run.
    Kill,
    /// Atomic swap of non-critical settings.
    ConfigUpdate,
    /// Runtime environment management (build, delete, list).
    RuntimeManage,
}

crate::wire_enum! {
    ControlKind {
        Cancel => "cancel",
        Kill => "kill",
        ConfigUpdate => "config_update",
        RuntimeManage => "runtime_manage",
    }
}

/// One control-plane message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub kind: ControlKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Transport receipt for ack.
    #[serde(default)]
    pub receipt: String,
}

impl ControlMessage {
    pub fn cancel(run_id: impl Into<String>) -> Self {
        Self {
            kind: ControlKind::Cancel,
            task_id: None,
            run_id: Some(run_id.into()),
            payload: None,
            receipt: String::new(),
        }
    }
}

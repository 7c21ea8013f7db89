// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability model.
//!
//! A capability is an optional runtime feature a worker advertises
//! (a browser engine, an HTTP-impersonation client) so the dispatcher can
//! steer matching tasks to it. Detection itself lives with the worker;
//! these types ride in heartbeats.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One advertised capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Capability {
    pub fn enabled_at(path: impl Into<String>) -> Self {
        Self { enabled: true, path: Some(path.into()), headless: None, version: None }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

/// Capability name → detection result. BTreeMap for stable wire order.
pub type CapabilityMap = BTreeMap<String, Capability>;

/// Well-known capability names.
pub mod names {
    /// A controllable browser engine is installed.
    pub const BROWSER: &str = "browser";
    /// TLS-fingerprint-impersonating HTTP client is importable.
    pub const HTTP_IMPERSONATION: &str = "http-impersonation";
}

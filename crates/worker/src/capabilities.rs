// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability detection.
//!
//! A pure probe of the host run once at startup; the result rides in
//! every heartbeat so the dispatcher can steer capability-gated tasks.

use hive_core::capability::{names, Capability, CapabilityMap};
use std::path::{Path, PathBuf};

const BROWSER_BINARIES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

const IMPERSONATION_BINARIES: &[&str] = &["curl-impersonate", "curl_chrome116"];

/// Detect all capabilities against the current PATH.
pub fn detect_all() -> CapabilityMap {
    detect_with_path(&std::env::var("PATH").unwrap_or_default())
}

/// Detect against an explicit PATH string (testable).
pub fn detect_with_path(path: &str) -> CapabilityMap {
    let mut capabilities = CapabilityMap::new();
    capabilities.insert(
        names::BROWSER.to_string(),
        match find_in_path(path, BROWSER_BINARIES) {
            Some(found) => {
                let mut cap = Capability::enabled_at(found.to_string_lossy().into_owned());
                cap.headless = Some(default_headless());
                cap
            }
            None => Capability::disabled(),
        },
    );
    capabilities.insert(
        names::HTTP_IMPERSONATION.to_string(),
        match find_in_path(path, IMPERSONATION_BINARIES) {
            Some(found) => Capability::enabled_at(found.to_string_lossy().into_owned()),
            None => Capability::disabled(),
        },
    );
    capabilities
}

/// Headless by default unless a display is available.
fn default_headless() -> bool {
    std::env::var("DISPLAY").map(|v| v.is_empty()).unwrap_or(true)
}

fn find_in_path(path: &str, names: &[&str]) -> Option<PathBuf> {
    for dir in std::env::split_paths(path) {
        for name in names {
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
#[path = "capabilities_tests.rs"]
mod tests;

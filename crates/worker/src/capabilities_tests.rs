// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hive_core::capability::names;
use tempfile::tempdir;

#[cfg(unix)]
fn make_executable(dir: &Path, name: &str) {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn empty_path_detects_nothing() {
    let caps = detect_with_path("");
    assert!(!caps[names::BROWSER].enabled);
    assert!(!caps[names::HTTP_IMPERSONATION].enabled);
}

#[cfg(unix)]
#[test]
fn detects_browser_binary_on_path() {
    let dir = tempdir().unwrap();
    make_executable(dir.path(), "chromium");
    let caps = detect_with_path(&dir.path().to_string_lossy());

    let browser = &caps[names::BROWSER];
    assert!(browser.enabled);
    assert!(browser.path.as_deref().unwrap_or("").contains("chromium"));
    assert!(browser.headless.is_some());
}

#[cfg(unix)]
#[test]
fn detects_impersonation_client() {
    let dir = tempdir().unwrap();
    make_executable(dir.path(), "curl-impersonate");
    let caps = detect_with_path(&dir.path().to_string_lossy());
    assert!(caps[names::HTTP_IMPERSONATION].enabled);
}

#[cfg(unix)]
#[test]
fn non_executable_files_do_not_count() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("chromium"), "not a binary").unwrap();
    let caps = detect_with_path(&dir.path().to_string_lossy());
    assert!(!caps[names::BROWSER].enabled);
}

#[test]
fn every_known_capability_is_reported() {
    let caps = detect_with_path("");
    assert!(caps.contains_key(names::BROWSER));
    assert!(caps.contains_key(names::HTTP_IMPERSONATION));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    plain = { "Python 3.12.4\n", Some("3.12.4") },
    no_patch = { "Python 3.11\n", Some("3.11") },
    garbage = { "zsh: command not found", None },
    empty = { "", None },
)]
fn parses_version_output(text: &str, expected: Option<&str>) {
    assert_eq!(parse_version_output(text).as_deref(), expected);
}

#[parameterized(
    exact = { "3.12.4", "3.12.4", true },
    prefix = { "3.12.4", "3.12", true },
    major_only = { "3.12.4", "3", true },
    empty_prefix = { "3.12.4", "", true },
    component_boundary = { "3.12.4", "3.1", false },
    mismatch = { "3.11.9", "3.12", false },
    longer_than_full = { "3.12", "3.12.4", false },
)]
fn version_prefix_matching(full: &str, prefix: &str, expected: bool) {
    assert_eq!(version_matches(full, prefix), expected);
}

#[tokio::test]
async fn unsatisfiable_version_reports_not_found() {
    // No interpreter anywhere will report version 99.99.
    let err = find_interpreter("99.99", &[]).await.unwrap_err();
    assert!(matches!(err, crate::RuntimeError::InterpreterNotFound { version } if version == "99.99"));
}

#[tokio::test]
async fn preregistered_interpreter_must_exist_on_disk() {
    let missing = vec![("99.98".to_string(), std::path::PathBuf::from("/nonexistent/python"))];
    let err = find_interpreter("99.98", &missing).await.unwrap_err();
    assert!(matches!(err, crate::RuntimeError::InterpreterNotFound { .. }));
}

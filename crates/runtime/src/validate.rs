// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Package requirement validation.
//!
//! Requirement strings are passed to the package manager on its command
//! line; a name starting with `-` would be parsed as a flag. Everything
//! is checked before any build command is assembled.

use crate::RuntimeError;
use std::sync::OnceLock;

static PACKAGE_NAME: OnceLock<regex::Regex> = OnceLock::new();

fn package_name_re() -> &'static regex::Regex {
    PACKAGE_NAME.get_or_init(|| {
        // First char must be alphanumeric, which also rules out a leading
        // `-` (flag injection). The tail covers extras, version pins, env
        // markers, and direct URLs.
        match regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._@/+=:~\[\](\),<>!#\s-]*$") {
            Ok(re) => re,
            Err(_) => unreachable!("package-name pattern is a valid literal"),
        }
    })
}

/// Validate a single requirement string.
pub fn validate_package_name(name: &str) -> Result<(), RuntimeError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || !package_name_re().is_match(trimmed) {
        return Err(RuntimeError::InvalidPackageName { name: name.to_string() });
    }
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Python interpreter discovery.
//!
//! Selection order: version manager (`mise`) → preregistered local
//! interpreters → system python on PATH. The first interpreter whose
//! reported version matches the requested prefix wins.

use crate::command::run_command;
use crate::RuntimeError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const DISCOVER_TIMEOUT: Duration = Duration::from_secs(60);

/// Where an interpreter was found, for logs and manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterSource {
    Mise,
    Preregistered,
    System,
}

/// A discovered interpreter.
#[derive(Debug, Clone)]
pub struct PythonInterpreter {
    pub executable: PathBuf,
    /// Full reported version, e.g. "3.12.4".
    pub version: String,
    pub source: InterpreterSource,
}

/// Find an interpreter matching `version` (a prefix like "3.12").
///
/// `preregistered` is a list of `(version, executable)` pairs from
/// configuration, checked after mise and before PATH.
pub async fn find_interpreter(
    version: &str,
    preregistered: &[(String, PathBuf)],
) -> Result<PythonInterpreter, RuntimeError> {
    if let Some(found) = find_via_mise(version).await {
        return Ok(found);
    }

    for (ver, path) in preregistered {
        if version_matches(ver, version) && path.exists() {
            debug!(version = %ver, path = %path.display(), "using preregistered interpreter");
            return Ok(PythonInterpreter {
                executable: path.clone(),
                version: ver.clone(),
                source: InterpreterSource::Preregistered,
            });
        }
    }

    for candidate in ["python3", "python"] {
        if let Some(found) = probe_system(candidate, version).await {
            return Ok(found);
        }
    }

    Err(RuntimeError::InterpreterNotFound { version: version.to_string() })
}

/// Ask mise for an installed python matching the version.
async fn find_via_mise(version: &str) -> Option<PythonInterpreter> {
    let spec = format!("python@{version}");
    let output = run_command("mise", &["where", &spec], None, DISCOVER_TIMEOUT).await.ok()?;
    if !output.success() {
        return None;
    }
    let root = PathBuf::from(output.stdout.trim());
    let executable = mise_python_path(&root);
    if !executable.exists() {
        return None;
    }
    debug!(version, path = %executable.display(), "using mise interpreter");
    // Trust mise's version resolution; report the requested prefix.
    Some(PythonInterpreter {
        executable,
        version: version.to_string(),
        source: InterpreterSource::Mise,
    })
}

fn mise_python_path(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("python.exe")
    } else {
        root.join("bin").join("python3")
    }
}

/// Probe a PATH candidate and keep it if the version prefix matches.
async fn probe_system(candidate: &str, version: &str) -> Option<PythonInterpreter> {
    let output = run_command(candidate, &["--version"], None, DISCOVER_TIMEOUT).await.ok()?;
    if !output.success() {
        return None;
    }
    // `python --version` may print to stdout or stderr depending on vintage.
    let text = if output.stdout.trim().is_empty() { &output.stderr } else { &output.stdout };
    let reported = parse_version_output(text)?;
    if !version_matches(&reported, version) {
        return None;
    }
    debug!(candidate, reported, "using system interpreter");
    Some(PythonInterpreter {
        executable: PathBuf::from(candidate),
        version: reported,
        source: InterpreterSource::System,
    })
}

/// Extract "3.12.4" from "Python 3.12.4".
pub(crate) fn parse_version_output(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix("Python ")?;
    let version: String =
        rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    if version.is_empty() {
        None
    } else {
        Some(version)
    }
}

/// Prefix match on dotted version components: "3.12" matches "3.12.4"
/// but not "3.1" vs "3.12".
pub(crate) fn version_matches(full: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    let full_parts: Vec<&str> = full.split('.').collect();
    let prefix_parts: Vec<&str> = prefix.split('.').collect();
    if prefix_parts.len() > full_parts.len() {
        return false;
    }
    full_parts.iter().zip(&prefix_parts).all(|(f, p)| f == p)
}

#[cfg(test)]
#[path = "interpreter_tests.rs"]
mod tests;

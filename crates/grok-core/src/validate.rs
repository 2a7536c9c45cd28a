// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Syntax validation for files modified by an agent.
//!
//! Dispatch by suffix: `.py` runs a syntax-only compile, `.js`/`.jsx` run the
//! node parser in check mode, `.ts`/`.tsx` run the type-checker in no-emit
//! mode, `.json` is parsed strictly in-process.  A checker that times out or
//! is not installed counts as valid — the gate must never block completion on
//! missing host tooling.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

const CHECK_TIMEOUT_SECS: u64 = 10;
const TSC_TIMEOUT_SECS: u64 = 30;

/// Check one file.  Returns `(is_valid, error_description)`; the description
/// is empty when valid.
pub async fn check_file_syntax(file_path: &str) -> (bool, String) {
    let path = Path::new(file_path);
    if !path.exists() {
        return (true, String::new());
    }
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or(file_path);
    let suffix = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();

    match suffix.as_str() {
        "py" => {
            run_checker(
                &["python3", "-m", "py_compile", file_path],
                CHECK_TIMEOUT_SECS,
                &format!("Python syntax error in {name}"),
            )
            .await
        }
        "js" | "jsx" => {
            run_checker(
                &["node", "--check", file_path],
                CHECK_TIMEOUT_SECS,
                &format!("Syntax error in {name}"),
            )
            .await
        }
        "ts" | "tsx" => {
            run_checker(
                &["npx", "tsc", "--noEmit", "--skipLibCheck", file_path],
                TSC_TIMEOUT_SECS,
                &format!("Syntax error in {name}"),
            )
            .await
        }
        "json" => match tokio::fs::read_to_string(path).await {
            Ok(text) => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(_) => (true, String::new()),
                Err(e) => (false, format!("JSON syntax error in {name}: {e}")),
            },
            Err(_) => (true, String::new()),
        },
        _ => (true, String::new()),
    }
}

/// Run an external checker.  Non-zero exit is a syntax failure; spawn errors
/// (checker not installed) and timeouts are treated as valid.
async fn run_checker(argv: &[&str], timeout_secs: u64, label: &str) -> (bool, String) {
    let mut cmd = tokio::process::Command::new(argv[0]);
    cmd.args(&argv[1..])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let result = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await;
    match result {
        Ok(Ok(output)) if !output.status.success() => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let raw = if stderr.trim().is_empty() { stdout } else { stderr };
            // The first few lines carry the actual diagnostic.
            let head: Vec<&str> = raw.trim().lines().take(5).collect();
            (false, format!("{label}:\n{}", head.join("\n")))
        }
        Ok(Ok(_)) => (true, String::new()),
        Ok(Err(e)) => {
            debug!(checker = argv[0], error = %e, "syntax checker unavailable; skipping");
            (true, String::new())
        }
        Err(_) => {
            debug!(checker = argv[0], "syntax checker timed out; skipping");
            (true, String::new())
        }
    }
}

/// Validate every modified file.  Returns `(all_valid, errors)`.
pub async fn validate_modified_files(files: &HashSet<String>) -> (bool, Vec<String>) {
    let mut errors = Vec::new();
    for file in files {
        let (valid, error) = check_file_syntax(file).await;
        if !valid {
            errors.push(error);
        }
    }
    (errors.is_empty(), errors)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

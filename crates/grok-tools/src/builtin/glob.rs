// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::state::resolve_path;
use crate::tool::{opt_str, require_str, Tool};

const MAX_RESULTS: usize = 100;

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g. \"**/*.py\" for all Python files). \
         Results are sorted by modification time, most recent first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "The glob pattern to match (e.g. \"**/*.py\", \"src/**/*.ts\")"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search in. Defaults to current directory."
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let pattern = match require_str(args, "pattern") {
            Ok(p) => p.to_string(),
            Err(e) => return e,
        };
        let root = match opt_str(args, "path") {
            Some(p) => resolve_path(p),
            None => std::env::current_dir().unwrap_or_default(),
        };

        debug!(pattern = %pattern, root = %root.display(), "glob tool");

        if !root.exists() {
            return format!("Error: Directory not found: {}", root.display());
        }

        // The walk can touch many directories; keep it off the async path.
        let result = tokio::task::spawn_blocking(move || run_glob(&root, &pattern)).await;
        match result {
            Ok(output) => output,
            Err(e) => format!("Error searching: {e}"),
        }
    }
}

fn run_glob(root: &std::path::Path, pattern: &str) -> String {
    let full_pattern = format!("{}/{}", root.display(), pattern);
    let entries = match glob::glob(&full_pattern) {
        Ok(paths) => paths,
        Err(e) => return format!("Error searching: {e}"),
    };

    let mut matches: Vec<(PathBuf, SystemTime)> = entries
        .filter_map(Result::ok)
        .map(|p| {
            let mtime = p
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (p, mtime)
        })
        .collect();

    if matches.is_empty() {
        return format!("No files found matching pattern: {pattern}");
    }

    // Most recently modified first.
    matches.sort_by(|a, b| b.1.cmp(&a.1));

    let total = matches.len();
    let truncated = total > MAX_RESULTS;
    matches.truncate(MAX_RESULTS);

    let lines: Vec<String> = matches
        .iter()
        .map(|(p, _)| {
            p.strip_prefix(root)
                .map(|rel| rel.display().to_string())
                .unwrap_or_else(|_| p.display().to_string())
        })
        .collect();

    let mut output = lines.join("\n");
    if truncated {
        output.push_str(&format!("\n\n... (showing first {MAX_RESULTS} of {total} matches)"));
    }
    output
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("a.py"), "a").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("src/c.py"), "c").unwrap();
        dir
    }

    #[tokio::test]
    async fn finds_files_recursively() {
        let dir = tree();
        let out = GlobTool
            .execute(&json!({"pattern": "**/*.py", "path": dir.path().to_str().unwrap()}))
            .await;
        assert!(out.contains("a.py"), "got: {out}");
        assert!(out.contains("src/c.py"), "got: {out}");
        assert!(!out.contains("b.txt"));
    }

    #[tokio::test]
    async fn reports_relative_paths() {
        let dir = tree();
        let out = GlobTool
            .execute(&json!({"pattern": "*.txt", "path": dir.path().to_str().unwrap()}))
            .await;
        assert_eq!(out.trim(), "b.txt");
    }

    #[tokio::test]
    async fn no_match_message() {
        let dir = tree();
        let out = GlobTool
            .execute(&json!({"pattern": "*.zig", "path": dir.path().to_str().unwrap()}))
            .await;
        assert!(out.contains("No files found matching pattern"));
    }

    #[tokio::test]
    async fn missing_directory_is_error() {
        let out = GlobTool
            .execute(&json!({"pattern": "*.rs", "path": "/tmp/grok_glob_no_such_dir_xyz"}))
            .await;
        assert!(out.starts_with("Error: Directory not found"));
    }

    #[tokio::test]
    async fn missing_pattern_is_error() {
        let out = GlobTool.execute(&json!({})).await;
        assert!(out.starts_with("Error:"));
        assert!(out.contains("'pattern'"));
    }

    #[tokio::test]
    async fn results_capped_with_notice() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..105 {
            std::fs::write(dir.path().join(format!("f{i:03}.log")), "x").unwrap();
        }
        let out = GlobTool
            .execute(&json!({"pattern": "*.log", "path": dir.path().to_str().unwrap()}))
            .await;
        let rows = out.lines().filter(|l| l.ends_with(".log")).count();
        assert_eq!(rows, 100, "exactly the cap: {out}");
        assert!(out.contains("showing first 100 of 105 matches"), "got: {out}");
    }

    #[tokio::test]
    async fn sorted_by_mtime_descending() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.dat");
        let new = dir.path().join("new.dat");
        std::fs::write(&old, "1").unwrap();
        std::fs::write(&new, "2").unwrap();
        // Push the older file clearly into the past.
        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        let ft = filetime_from(past);
        set_mtime(&old, ft);

        let out = GlobTool
            .execute(&json!({"pattern": "*.dat", "path": dir.path().to_str().unwrap()}))
            .await;
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "new.dat", "most recent first: {out}");
        assert_eq!(lines[1], "old.dat");
    }

    fn filetime_from(t: std::time::SystemTime) -> (i64, u32) {
        let d = t.duration_since(std::time::UNIX_EPOCH).unwrap();
        (d.as_secs() as i64, d.subsec_nanos())
    }

    fn set_mtime(path: &std::path::Path, (secs, _nanos): (i64, u32)) {
        // Portable-enough mtime rewind via the `touch` utility.
        let stamp = chrono::DateTime::from_timestamp(secs, 0)
            .unwrap()
            .format("%Y%m%d%H%M.%S")
            .to_string();
        let _ = std::process::Command::new("touch")
            .args(["-m", "-t", &stamp, path.to_str().unwrap()])
            .status();
    }
}

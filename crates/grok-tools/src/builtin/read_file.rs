// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::state::{resolve_path, ReadSet};
use crate::tool::{opt_u64, require_str, Tool};

pub struct ReadTool {
    read_files: Arc<Mutex<ReadSet>>,
}

impl ReadTool {
    pub fn new(read_files: Arc<Mutex<ReadSet>>) -> Self {
        Self { read_files }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Returns the file contents with line numbers. \
         Always read a file before editing or overwriting it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The path to the file to read (absolute or relative to cwd)"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-indexed). Optional."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read. Optional."
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let file_path = match require_str(args, "file_path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let offset = opt_u64(args, "offset");
        let limit = opt_u64(args, "limit");

        let path = resolve_path(file_path);
        debug!(path = %path.display(), "read_file tool");

        if !path.exists() {
            return format!("Error: File not found: {}", path.display());
        }
        if !path.is_file() {
            return format!("Error: Not a file: {}", path.display());
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => return format!("Error reading file: {e}"),
        };
        let text = String::from_utf8_lossy(&bytes);

        // A successful read arms the write/edit safety check.
        self.read_files.lock().await.mark(file_path);

        let start = offset.filter(|o| *o > 0).map(|o| (o - 1) as usize).unwrap_or(0);
        let lines: Vec<&str> = text.lines().collect();
        let end = limit.map(|l| (start + l as usize).min(lines.len())).unwrap_or(lines.len());
        if start >= lines.len() {
            return "(empty file)".to_string();
        }

        let rendered: Vec<String> = lines[start..end]
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>6}│{}", start + i + 1, line.trim_end()))
            .collect();

        if rendered.is_empty() {
            "(empty file)".to_string()
        } else {
            rendered.join("\n")
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn make_tool() -> (ReadTool, Arc<Mutex<ReadSet>>) {
        let read_files = Arc::new(Mutex::new(ReadSet::default()));
        (ReadTool::new(read_files.clone()), read_files)
    }

    fn tmp_file(content: &str) -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let path = format!("/tmp/grok_read_test_{}_{n}.txt", std::process::id());
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn reads_with_right_aligned_line_numbers() {
        let path = tmp_file("alpha\nbeta\n");
        let (tool, _) = make_tool();
        let out = tool.execute(&json!({"file_path": path})).await;
        assert!(out.contains("     1│alpha"), "unexpected format: {out}");
        assert!(out.contains("     2│beta"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn indentation_is_preserved_after_separator() {
        let path = tmp_file("    indented line\n");
        let (tool, _) = make_tool();
        let out = tool.execute(&json!({"file_path": path})).await;
        assert!(out.contains("│    indented line"), "indentation lost: {out}");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn offset_and_limit_slice_lines() {
        let path = tmp_file("one\ntwo\nthree\nfour\n");
        let (tool, _) = make_tool();
        let out = tool.execute(&json!({"file_path": path, "offset": 2, "limit": 2})).await;
        assert!(out.contains("2│two"));
        assert!(out.contains("3│three"));
        assert!(!out.contains("1│one"));
        assert!(!out.contains("4│four"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn empty_file_returns_marker() {
        let path = tmp_file("");
        let (tool, _) = make_tool();
        let out = tool.execute(&json!({"file_path": path})).await;
        assert_eq!(out, "(empty file)");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn successful_read_inserts_into_read_set() {
        let path = tmp_file("content\n");
        let (tool, read_files) = make_tool();
        tool.execute(&json!({"file_path": path})).await;
        assert!(read_files.lock().await.contains(&path));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_is_error_and_not_marked() {
        let (tool, read_files) = make_tool();
        let out = tool.execute(&json!({"file_path": "/tmp/grok_no_such_file_xyz.txt"})).await;
        assert!(out.starts_with("Error: File not found"));
        assert!(read_files.lock().await.is_empty());
    }

    #[tokio::test]
    async fn directory_is_not_a_file() {
        let (tool, _) = make_tool();
        let out = tool.execute(&json!({"file_path": "/tmp"})).await;
        assert!(out.starts_with("Error: Not a file"));
    }

    #[tokio::test]
    async fn missing_argument_is_error() {
        let (tool, _) = make_tool();
        let out = tool.execute(&json!({})).await;
        assert!(out.starts_with("Error:"));
        assert!(out.contains("'file_path'"));
    }

    #[tokio::test]
    async fn invalid_utf8_reads_with_replacement() {
        let path = tmp_file("");
        std::fs::write(&path, [b'o', b'k', 0xFF, b'\n']).unwrap();
        let (tool, _) = make_tool();
        let out = tool.execute(&json!({"file_path": path})).await;
        assert!(out.contains("ok"), "lossy read expected: {out}");
        let _ = std::fs::remove_file(&path);
    }
}

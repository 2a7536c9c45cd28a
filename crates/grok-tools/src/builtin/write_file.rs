// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::policy::PermissionGate;
use crate::state::{resolve_path, ReadSet};
use crate::tool::{require_str, Tool};

pub struct WriteTool {
    read_files: Arc<Mutex<ReadSet>>,
    gate: Arc<PermissionGate>,
}

impl WriteTool {
    pub fn new(read_files: Arc<Mutex<ReadSet>>, gate: Arc<PermissionGate>) -> Self {
        Self { read_files, gate }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does. \
         Existing files must be read before they can be overwritten."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let file_path = match require_str(args, "file_path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let content = match require_str(args, "content") {
            Ok(c) => c,
            Err(e) => return e,
        };

        let path = resolve_path(file_path);
        debug!(path = %path.display(), bytes = content.len(), "write_file tool");

        // Overwriting a file that was never read is refused outright — the
        // file on disk is left untouched.
        if path.exists() && !self.read_files.lock().await.contains(file_path) {
            return format!(
                "Error: Cannot write to {} - file exists but has not been read first. \
                 Read the file before modifying it.",
                path.display()
            );
        }

        if let Err(msg) = self.gate.request("write_file", args).await {
            return msg;
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return format!("Error writing file: {e}");
                }
            }
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => {
                // Must be re-read before the next modification.
                self.read_files.lock().await.unmark(file_path);
                format!("Successfully wrote {} bytes to {}", content.len(), path.display())
            }
            Err(e) => format!("Error writing file: {e}"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::policy::{ApprovalMode, DenyPrompt};

    fn make_tool(dir: &std::path::Path) -> (WriteTool, Arc<Mutex<ReadSet>>) {
        let read_files = Arc::new(Mutex::new(ReadSet::default()));
        let gate = Arc::new(PermissionGate::with_path(
            Arc::new(DenyPrompt),
            dir.join("permissions.json"),
        ));
        gate.set_mode(ApprovalMode::Auto);
        (WriteTool::new(read_files.clone(), gate), read_files)
    }

    #[tokio::test]
    async fn writes_new_file_and_reports_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("new.txt");
        let (tool, _) = make_tool(dir.path());
        let out = tool
            .execute(&json!({"file_path": target.to_str().unwrap(), "content": "hi"}))
            .await;
        assert!(out.starts_with("Successfully wrote 2 bytes"), "got: {out}");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hi");
    }

    #[tokio::test]
    async fn refuses_overwrite_of_unread_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("existing.txt");
        std::fs::write(&target, "original").unwrap();
        let (tool, _) = make_tool(dir.path());
        let out = tool
            .execute(&json!({"file_path": target.to_str().unwrap(), "content": "clobber"}))
            .await;
        assert!(out.contains("has not been read first"), "got: {out}");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "original", "file must be untouched");
    }

    #[tokio::test]
    async fn overwrite_allowed_after_read_and_unmarks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f.txt");
        std::fs::write(&target, "v1").unwrap();
        let (tool, read_files) = make_tool(dir.path());
        let path_str = target.to_str().unwrap().to_string();
        read_files.lock().await.mark(&path_str);

        let out = tool.execute(&json!({"file_path": path_str, "content": "v2"})).await;
        assert!(out.starts_with("Successfully wrote"));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "v2");
        assert!(
            !read_files.lock().await.contains(target.to_str().unwrap()),
            "write must remove the path from the read set"
        );
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c.txt");
        let (tool, _) = make_tool(dir.path());
        let out = tool
            .execute(&json!({"file_path": target.to_str().unwrap(), "content": "nested"}))
            .await;
        assert!(out.starts_with("Successfully wrote"), "got: {out}");
        assert!(target.exists());
    }

    #[tokio::test]
    async fn gated_write_returns_policy_error_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let read_files = Arc::new(Mutex::new(ReadSet::default()));
        let gate = Arc::new(PermissionGate::with_path(
            Arc::new(DenyPrompt),
            dir.path().join("permissions.json"),
        ));
        gate.set_mode(ApprovalMode::Approve);
        let tool = WriteTool::new(read_files, gate);

        let target = dir.path().join("gated.txt");
        let out = tool
            .execute(&json!({"file_path": target.to_str().unwrap(), "content": "x"}))
            .await;
        assert!(out.contains("Permission required"), "got: {out}");
        assert!(!target.exists(), "denied write must not touch disk");
    }

    #[tokio::test]
    async fn missing_content_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _) = make_tool(dir.path());
        let out = tool.execute(&json!({"file_path": "/tmp/x.txt"})).await;
        assert!(out.starts_with("Error:"));
        assert!(out.contains("'content'"));
    }
}

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
use crate::tool::{opt_bool, require_str, Tool};

pub struct EditTool {
    read_files: Arc<Mutex<ReadSet>>,
    gate: Arc<PermissionGate>,
}

impl EditTool {
    pub fn new(read_files: Arc<Mutex<ReadSet>>, gate: Arc<PermissionGate>) -> Self {
        Self { read_files, gate }
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing a specific string with another. The old_string must match \
         exactly, including whitespace and indentation. The file must have been read first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact string to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The string to replace it with"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "If true, replace all occurrences. Default is false (replace first only)."
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let file_path = match require_str(args, "file_path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let old_string = match require_str(args, "old_string") {
            Ok(s) => s,
            Err(e) => return e,
        };
        let new_string = match require_str(args, "new_string") {
            Ok(s) => s,
            Err(e) => return e,
        };
        let replace_all = opt_bool(args, "replace_all").unwrap_or(false);

        let path = resolve_path(file_path);
        debug!(path = %path.display(), replace_all, "edit_file tool");

        if !path.exists() {
            return format!("Error: File not found: {}", path.display());
        }
        if !self.read_files.lock().await.contains(file_path) {
            return format!(
                "Error: Cannot edit {} - file has not been read first. \
                 Read the file before modifying it.",
                path.display()
            );
        }

        if let Err(msg) = self.gate.request("edit_file", args).await {
            return msg;
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return format!("Error reading file: {e}"),
        };

        if !content.contains(old_string) {
            return not_found_diagnostic(&path, &content, old_string);
        }

        let count = content.matches(old_string).count();
        if count > 1 && !replace_all {
            return format!(
                "Error: Found {count} occurrences of the string. Use replace_all=true to \
                 replace all, or provide more context to make the match unique."
            );
        }

        let (new_content, replaced) = if replace_all {
            (content.replace(old_string, new_string), count)
        } else {
            (content.replacen(old_string, new_string, 1), 1)
        };

        match tokio::fs::write(&path, new_content).await {
            Ok(()) => {
                self.read_files.lock().await.unmark(file_path);
                format!("Successfully replaced {replaced} occurrence(s) in {}", path.display())
            }
            Err(e) => format!("Error writing file: {e}"),
        }
    }
}

/// Build the diagnostic for a missed match.  The most common failure is
/// whitespace drift, so try the stripped form and then the first line of the
/// stripped form, reporting the indentation actually present in the file.
fn not_found_diagnostic(path: &std::path::Path, content: &str, old_string: &str) -> String {
    let base = format!("Error: Could not find the specified string in {}", path.display());

    let stripped = old_string.trim();
    if !stripped.is_empty() && content.contains(stripped) {
        if let Some(line) = content.lines().find(|l| l.contains(stripped)) {
            let indent = line.len() - line.trim_start().len();
            return format!(
                "{base}. The text was found when ignoring surrounding whitespace - the \
                 matching line is indented with {indent} space(s). Re-read the file and copy \
                 the exact indentation into old_string."
            );
        }
        return format!(
            "{base}. The text was found when ignoring surrounding whitespace - check the \
             leading and trailing whitespace of old_string."
        );
    }

    if let Some(first_line) = stripped.lines().next().filter(|l| !l.trim().is_empty()) {
        let needle = first_line.trim();
        if let Some(line) = content.lines().find(|l| l.contains(needle)) {
            let indent = line.len() - line.trim_start().len();
            return format!(
                "{base}. The first line of old_string appears in the file with {indent} \
                 space(s) of indentation: '{}'. Re-read the file and match that indentation.",
                line.trim_end()
            );
        }
    }

    base
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::policy::{ApprovalMode, DenyPrompt};

    struct Fixture {
        tool: EditTool,
        read_files: Arc<Mutex<ReadSet>>,
        _dir: tempfile::TempDir,
        target: std::path::PathBuf,
    }

    async fn fixture(content: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("file.txt");
        std::fs::write(&target, content).unwrap();
        let read_files = Arc::new(Mutex::new(ReadSet::default()));
        let gate = Arc::new(PermissionGate::with_path(
            Arc::new(DenyPrompt),
            dir.path().join("permissions.json"),
        ));
        gate.set_mode(ApprovalMode::Auto);
        read_files.lock().await.mark(target.to_str().unwrap());
        Fixture { tool: EditTool::new(read_files.clone(), gate), read_files, _dir: dir, target }
    }

    #[tokio::test]
    async fn replaces_first_occurrence() {
        let f = fixture("aaa bbb aaa\n").await;
        let out = f
            .tool
            .execute(&json!({
                "file_path": f.target.to_str().unwrap(),
                "old_string": "bbb",
                "new_string": "ccc"
            }))
            .await;
        assert!(out.contains("Successfully replaced 1 occurrence(s)"), "got: {out}");
        assert_eq!(std::fs::read_to_string(&f.target).unwrap(), "aaa ccc aaa\n");
    }

    #[tokio::test]
    async fn multiple_matches_require_replace_all() {
        let f = fixture("x\nx\nx\n").await;
        let args = json!({
            "file_path": f.target.to_str().unwrap(),
            "old_string": "x",
            "new_string": "y"
        });
        let out = f.tool.execute(&args).await;
        assert!(out.contains("Found 3 occurrences"), "got: {out}");
        assert_eq!(std::fs::read_to_string(&f.target).unwrap(), "x\nx\nx\n", "file untouched");
    }

    #[tokio::test]
    async fn replace_all_reports_count() {
        let f = fixture("x x x\n").await;
        let out = f
            .tool
            .execute(&json!({
                "file_path": f.target.to_str().unwrap(),
                "old_string": "x",
                "new_string": "y",
                "replace_all": true
            }))
            .await;
        assert!(out.contains("Successfully replaced 3 occurrence(s)"), "got: {out}");
        assert_eq!(std::fs::read_to_string(&f.target).unwrap(), "y y y\n");
    }

    #[tokio::test]
    async fn unread_file_is_refused_and_untouched() {
        let f = fixture("content\n").await;
        f.read_files.lock().await.clear();
        let out = f
            .tool
            .execute(&json!({
                "file_path": f.target.to_str().unwrap(),
                "old_string": "content",
                "new_string": "other"
            }))
            .await;
        assert!(out.contains("has not been read first"), "got: {out}");
        assert_eq!(std::fs::read_to_string(&f.target).unwrap(), "content\n");
    }

    #[tokio::test]
    async fn successful_edit_unmarks_read_set() {
        let f = fixture("old\n").await;
        f.tool
            .execute(&json!({
                "file_path": f.target.to_str().unwrap(),
                "old_string": "old",
                "new_string": "new"
            }))
            .await;
        assert!(!f.read_files.lock().await.contains(f.target.to_str().unwrap()));
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let f = fixture("x\n").await;
        let out = f
            .tool
            .execute(&json!({
                "file_path": "/tmp/grok_edit_no_such_file.txt",
                "old_string": "a",
                "new_string": "b"
            }))
            .await;
        assert!(out.starts_with("Error: File not found"));
    }

    // ── Recovery diagnostics ──────────────────────────────────────────────────

    #[tokio::test]
    async fn whitespace_mismatch_reports_detected_indentation() {
        let f = fixture("    if condition:\n        do_something()\n").await;
        // Two leading and two trailing spaces: the exact match fails but the
        // stripped form exists in the file with 4-space indentation.
        let out = f
            .tool
            .execute(&json!({
                "file_path": f.target.to_str().unwrap(),
                "old_string": "  if condition:  ",
                "new_string": "x"
            }))
            .await;
        assert!(out.starts_with("Error: Could not find"), "got: {out}");
        assert!(out.contains("4 space(s)"), "should report indentation: {out}");
    }

    #[tokio::test]
    async fn first_line_hint_when_block_does_not_match() {
        let f = fixture("    def handler():\n        return 1\n").await;
        let out = f
            .tool
            .execute(&json!({
                "file_path": f.target.to_str().unwrap(),
                "old_string": "def handler():\n    return 2",
                "new_string": "x"
            }))
            .await;
        assert!(out.starts_with("Error: Could not find"), "got: {out}");
        assert!(out.contains("first line"), "should point at the first line: {out}");
        assert!(out.contains("4"), "should report the real indentation: {out}");
    }

    #[tokio::test]
    async fn plain_not_found_when_nothing_matches() {
        let f = fixture("completely different\n").await;
        let out = f
            .tool
            .execute(&json!({
                "file_path": f.target.to_str().unwrap(),
                "old_string": "absent text",
                "new_string": "x"
            }))
            .await;
        assert!(out.starts_with("Error: Could not find the specified string"));
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::state::resolve_path;
use crate::tool::{opt_bool, opt_str, require_str, Tool};

const MAX_MATCHES: usize = 100;

/// Extensions whose content is binary and never searched.
const BINARY_EXTENSIONS: &[&str] =
    &["png", "jpg", "gif", "pdf", "zip", "tar", "gz", "exe", "bin"];

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search for a regex pattern in file contents. Returns matching lines with file paths \
         and line numbers."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "The regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search in. Defaults to current directory."
                },
                "glob": {
                    "type": "string",
                    "description": "File pattern to filter (e.g. \"*.py\"). Defaults to all files."
                },
                "ignore_case": {
                    "type": "boolean",
                    "description": "Case-insensitive search. Default is false."
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
        let file_glob = opt_str(args, "glob").map(str::to_string);
        let ignore_case = opt_bool(args, "ignore_case").unwrap_or(false);

        debug!(pattern = %pattern, root = %root.display(), "grep tool");

        if !root.exists() {
            return format!("Error: Path not found: {}", root.display());
        }

        // Compile before walking so a bad pattern fails fast.
        let regex = match RegexBuilder::new(&pattern).case_insensitive(ignore_case).build() {
            Ok(re) => re,
            Err(e) => return format!("Error: Invalid regex pattern: {e}"),
        };

        let result = tokio::task::spawn_blocking(move || {
            run_grep(&root, &regex, file_glob.as_deref(), &pattern)
        })
        .await;
        match result {
            Ok(output) => output,
            Err(e) => format!("Error searching: {e}"),
        }
    }
}

fn run_grep(root: &Path, regex: &regex::Regex, file_glob: Option<&str>, pattern: &str) -> String {
    let glob_matcher = file_glob.and_then(|g| glob::Pattern::new(g).ok());

    let mut results: Vec<String> = Vec::new();

    if root.is_file() {
        search_file(root, root.parent().unwrap_or(root), regex, &mut results, usize::MAX);
    } else {
        // Stop walking once one extra match past the cap has been collected:
        // enough to know a truncation notice is needed.
        'walk: for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(matcher) = &glob_matcher {
                let name_matches = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| matcher.matches(n))
                    .unwrap_or(false);
                let rel_matches = path
                    .strip_prefix(root)
                    .ok()
                    .and_then(|r| r.to_str())
                    .map(|r| matcher.matches(r))
                    .unwrap_or(false);
                if !name_matches && !rel_matches {
                    continue;
                }
            }
            search_file(path, root, regex, &mut results, MAX_MATCHES + 1);
            if results.len() > MAX_MATCHES {
                break 'walk;
            }
        }
    }

    if results.is_empty() {
        return format!("No matches found for pattern: {pattern}");
    }

    let total = results.len();
    let truncated = total > MAX_MATCHES;
    results.truncate(MAX_MATCHES);
    let mut output = results.join("\n");
    if truncated {
        output.push_str(&format!("\n\n... (showing first {MAX_MATCHES} of {total} matches)"));
    }
    output
}

fn search_file(path: &Path, root: &Path, regex: &regex::Regex, out: &mut Vec<String>, cap: usize) {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return;
        }
    }
    let Ok(bytes) = std::fs::read(path) else {
        return;
    };
    let text = String::from_utf8_lossy(&bytes);
    let rel = path.strip_prefix(root).unwrap_or(path);
    for (line_num, line) in text.lines().enumerate() {
        if regex.is_match(line) {
            out.push(format!("{}:{}: {}", rel.display(), line_num + 1, line.trim_end()));
            if out.len() >= cap {
                return;
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

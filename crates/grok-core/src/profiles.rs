// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Profiles for the built-in agent kinds and plugin-defined agents.
//!
//! A profile is everything that distinguishes one kind from another; the
//! loop itself lives in [`crate::agent`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use grok_runtime::AgentDef;
use grok_tools::TaskStore;

use crate::agent::{AgentKind, AgentProfile, BASE_AGENT_RULES};

fn cwd_display() -> String {
    std::env::current_dir().unwrap_or_default().display().to_string()
}

/// Read-only exploration: find files, search code, summarize structure.
pub fn explore_profile() -> AgentProfile {
    let system_prompt = format!(
        "You are an exploration agent. Your job is to explore codebases and find information.\n\n\
         You have access to these tools:\n\
         - read_file: Read file contents\n\
         - glob: Find files by pattern\n\
         - grep: Search file contents\n\n\
         Be thorough but efficient. Search multiple patterns if needed. Summarize your \
         findings clearly.\n\n\
         Current working directory: {}\n",
        cwd_display()
    );
    AgentProfile {
        kind: AgentKind::Explore,
        system_prompt,
        allowed_tools: vec!["read_file".into(), "glob".into(), "grep".into()],
        max_turns: 10,
        finish_hooks: false,
        cancel_error: "Agent cancelled",
        default_output: "Exploration complete.",
        plan_file: None,
    }
}

/// Planning agent: explores, then writes a plan file with checkbox tasks.
pub fn plan_profile(prompt: &str) -> AgentProfile {
    let plans_dir = std::env::current_dir().unwrap_or_default().join(".grok").join("plans");
    let _ = std::fs::create_dir_all(&plans_dir);
    let plan_file = plans_dir.join(plan_filename(prompt));

    let system_prompt = format!(
        "{BASE_AGENT_RULES}\n\
         You are a software architect planning agent. Your job is to create detailed \
         implementation plans.\n\n\
         ## Process\n\
         1. First, explore the codebase to understand existing patterns and architecture\n\
         2. Design a clear implementation approach\n\
         3. Create a structured plan with specific tasks\n\n\
         ## Output Requirements\n\
         You MUST create a plan file at: {plan}\n\n\
         The plan file should follow this EXACT format:\n\n\
         ```markdown\n\
         # [Plan Title]\n\n\
         ## Overview\n\
         [1-2 paragraph summary of the approach]\n\n\
         ## Files to Modify\n\
         - `path/to/file1.py` - [what changes]\n\
         - `path/to/file2.py` - [what changes]\n\n\
         ## Implementation Tasks\n\n\
         - [ ] Task 1: [Clear, actionable task description]\n\
         - [ ] Task 2: [Clear, actionable task description]\n\
         ```\n\n\
         IMPORTANT:\n\
         - Use `- [ ]` for uncompleted tasks (checkbox format)\n\
         - Each task should be specific and actionable\n\
         - Tasks should be in logical order of execution\n\
         - Write the plan file using write_file tool - do NOT output the plan content to chat\n\
         - Keep your chat responses brief - the plan file is the deliverable\n\n\
         Current working directory: {cwd}\n",
        plan = plan_file.display(),
        cwd = cwd_display()
    );

    AgentProfile {
        kind: AgentKind::Plan,
        system_prompt,
        allowed_tools: vec![
            "read_file".into(),
            "glob".into(),
            "grep".into(),
            "write_file".into(),
        ],
        max_turns: 15,
        finish_hooks: false,
        cancel_error: "Agent cancelled",
        default_output: "Planning complete.",
        plan_file: Some(plan_file),
    }
}

/// Full-featured agent: unrestricted tools, finish hooks active.
pub fn general_profile() -> AgentProfile {
    let system_prompt = format!(
        "{BASE_AGENT_RULES}\n\
         You are a general-purpose coding agent with full access to all tools.\n\n\
         Your job is to implement features, fix bugs, and complete coding tasks autonomously.\n\n\
         ## Workflow\n\
         1. Read and understand existing code before making changes\n\
         2. Make edits using edit_file or write_file\n\
         3. Test your changes with bash if appropriate\n\
         4. Complete the task fully - no placeholders\n\n\
         Current working directory: {}\n",
        cwd_display()
    );
    AgentProfile {
        kind: AgentKind::General,
        system_prompt,
        allowed_tools: vec![],
        max_turns: 30,
        finish_hooks: true,
        cancel_error: "Agent cancelled",
        default_output: "Task complete.",
        plan_file: None,
    }
}

/// Agent defined by a plugin markdown file: shared base rules followed by
/// the definition body; allow-list from frontmatter (empty = unrestricted).
pub fn plugin_profile(def: &AgentDef) -> AgentProfile {
    AgentProfile {
        kind: AgentKind::Plugin,
        system_prompt: format!("{BASE_AGENT_RULES}\n---\n\n{}", def.prompt),
        allowed_tools: def.tools.clone(),
        max_turns: 50,
        finish_hooks: true,
        cancel_error: "Agent was cancelled",
        default_output: "Task complete.",
        plan_file: None,
    }
}

/// `<slug>_<timestamp>.md` derived from the planning prompt.
pub fn plan_filename(prompt: &str) -> String {
    const STOPWORDS: &[&str] = &["the", "and", "for", "with", "this", "that"];
    let keywords: Vec<String> = prompt
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .take(3)
        .collect();
    let slug = if keywords.is_empty() { "plan".to_string() } else { keywords.join("-") };
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{slug}_{stamp}.md")
}

/// Build the plan agent's final output: the plan's Overview and Files to
/// Modify sections, one `@@PLAN_TASK@@ id|status|subject` row per created
/// task, and the plan file path.
pub async fn plan_summary(
    plan_file: Option<&Path>,
    created_subjects: &[String],
    tasks: &Arc<Mutex<TaskStore>>,
) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    let plan_path: Option<PathBuf> = plan_file.filter(|p| p.exists()).map(Path::to_path_buf);
    if let Some(path) = &plan_path {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Some(overview) = extract_section(&content, "Overview") {
                parts.push("## Overview\n".to_string());
                parts.push(overview);
                parts.push(String::new());
            }
            if let Some(files) = extract_section(&content, "Files to Modify") {
                parts.push("## Files to Modify\n".to_string());
                parts.push(files);
                parts.push(String::new());
            }
        }
    }

    if !created_subjects.is_empty() {
        parts.push("## Tasks\n".to_string());
        let store = tasks.lock().await;
        for task in store.list_all() {
            if created_subjects.contains(&task.subject) {
                parts.push(format!(
                    "@@PLAN_TASK@@ {}|{}|{}",
                    task.id,
                    task.status.as_str(),
                    task.subject
                ));
            }
        }
    }

    if let Some(path) = &plan_path {
        parts.push(format!("\nFull plan: `{}`", path.display()));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Extract the body of a `## <name>` section up to the next `## ` heading.
fn extract_section(content: &str, name: &str) -> Option<String> {
    let header = format!("## {name}");
    let start = content.find(&header)? + header.len();
    let rest = &content[start..];
    let end = rest.find("\n## ").unwrap_or(rest.len());
    let body = rest[..end].trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The generic sub-agent conversation loop.
//!
//! Every agent kind (explore, plan, general, plugin) is an instance of this
//! loop; they differ only in system prompt, allowed-tool filter, turn cap,
//! and whether the finish hooks run.  The finish hooks fire when the model
//! stops emitting tool calls: syntax validation of modified files and a
//! pending-task reminder, each able to inject a corrective user message that
//! forces another turn.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use grok_model::{ChatTransport, Message, ToolCall};
use grok_tools::state::extract_checkbox_subjects;
use grok_tools::{TaskStore, ToolRegistry};

use crate::events::AgentEvent;
use crate::validate::validate_modified_files;

/// Rules prepended to every sub-agent system prompt.
pub const BASE_AGENT_RULES: &str = "## Base Rules (Always Follow)
1. USE TOOLS TO DO WORK - You MUST use Edit/Write tools to make changes. Never just describe what you would do - actually do it with tools.
2. Read before modify - Always read a file before editing or writing to it.
3. Work autonomously - Don't ask for permission. Just do the work.
4. Be thorough - Complete the entire task. No placeholders or TODOs.
5. Mark tasks complete - ONLY mark a task complete AFTER you have used Edit/Write tools to implement it.
6. NO FAKE COMPLETIONS - If you didn't use Edit/Write to change files, you didn't complete the task.
7. FIX SYNTAX ERRORS - Your modified files will be checked for syntax errors. You cannot finish until all errors are fixed.

## CRITICAL: How to Edit Files Correctly
The edit_file tool requires EXACT string matching including all whitespace and indentation.

When you read a file, you see output like:
```
    42│    def my_function(self):
    43│        if condition:
    44│            do_something()
```

The format is: `[line_number]│[actual_file_content]`
Everything AFTER the │ is the actual file content including indentation.

To edit lines 43-44, your old_string must include the EXACT indentation:
- Line 43 has 8 spaces before \"if\"
- Line 44 has 12 spaces before \"do_something\"

**Rules for editing:**
- Copy the EXACT whitespace you see after the │ in read_file output
- Include enough context (2-3 lines) to make the match unique
- If edit fails, re-read the file and check your indentation carefully
";

/// Injected syntax-error correction is bounded to this many consecutive
/// tool-free turns so a stuck agent still terminates.
const MAX_FINISH_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Explore,
    Plan,
    General,
    Plugin,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Explore => "explore",
            AgentKind::Plan => "plan",
            AgentKind::General => "general",
            AgentKind::Plugin => "plugin",
        }
    }
}

/// Result of one sub-agent run.  `output` carries whatever was accumulated,
/// including on failure and cancellation.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub agent_id: String,
    pub kind: AgentKind,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

/// Everything that distinguishes one agent kind from another.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub kind: AgentKind,
    pub system_prompt: String,
    /// Allowed tool names; empty means unrestricted.
    pub allowed_tools: Vec<String>,
    pub max_turns: u32,
    /// Enables modification tracking, the completion gate, syntax
    /// validation, and the pending-task reminder.
    pub finish_hooks: bool,
    /// Error string reported on cancellation.
    pub cancel_error: &'static str,
    /// Output used when the model produced no text at all.
    pub default_output: &'static str,
    /// Plan agents write their plan here and extract checkbox tasks.
    pub plan_file: Option<std::path::PathBuf>,
}

/// One instance of the sub-agent conversation loop.
pub struct SubAgent {
    pub agent_id: String,
    profile: AgentProfile,
    client: Arc<dyn ChatTransport>,
    registry: Arc<ToolRegistry>,
    tasks: Arc<Mutex<TaskStore>>,
    cancelled: Arc<AtomicBool>,
    cancel_check: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    status_tx: Option<mpsc::UnboundedSender<AgentEvent>>,
    /// Checkbox subjects already turned into tasks this run (plan agents).
    plan_tasks_created: Vec<String>,
}

impl SubAgent {
    pub fn new(
        profile: AgentProfile,
        client: Arc<dyn ChatTransport>,
        registry: Arc<ToolRegistry>,
        tasks: Arc<Mutex<TaskStore>>,
    ) -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self {
            agent_id: hex[..8].to_string(),
            profile,
            client,
            registry,
            tasks,
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel_check: None,
            status_tx: None,
            plan_tasks_created: Vec::new(),
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.profile.kind
    }

    /// Shared flag the runner flips to cancel this agent.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Additional cancellation predicate injected by the controller.
    pub fn set_cancel_check(&mut self, check: Arc<dyn Fn() -> bool + Send + Sync>) {
        self.cancel_check = Some(check);
    }

    pub fn set_status_channel(&mut self, tx: mpsc::UnboundedSender<AgentEvent>) {
        self.status_tx = Some(tx);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self.cancel_check.as_ref().map(|c| c()).unwrap_or(false)
    }

    fn status(&self, status: &str) {
        if let Some(tx) = &self.status_tx {
            let _ = tx.send(AgentEvent::AgentStatus {
                agent_id: self.agent_id.clone(),
                status: status.to_string(),
            });
        }
    }

    fn cancelled_result(&self, output: &[String]) -> AgentResult {
        AgentResult {
            agent_id: self.agent_id.clone(),
            kind: self.profile.kind,
            success: false,
            output: output.join("\n"),
            error: Some(self.profile.cancel_error.to_string()),
        }
    }

    fn has_task_tools(&self, allowed_lower: &HashSet<String>) -> bool {
        if allowed_lower.is_empty() {
            self.registry.get("task_update").is_some()
        } else {
            allowed_lower.contains("task_update") || allowed_lower.contains("task_list")
        }
    }

    /// Run the loop to completion and return the result.
    pub async fn run(mut self, prompt: &str) -> AgentResult {
        let allowed_lower: HashSet<String> =
            self.profile.allowed_tools.iter().map(|t| t.to_lowercase()).collect();

        let all_schemas = self.registry.schemas();
        let tools: Vec<Value> = if allowed_lower.is_empty() {
            all_schemas
        } else {
            all_schemas
                .into_iter()
                .filter(|schema| {
                    schema["function"]["name"]
                        .as_str()
                        .map(|n| allowed_lower.contains(&n.to_lowercase()))
                        .unwrap_or(false)
                })
                .collect()
        };

        let mut messages = vec![
            Message::system(&self.profile.system_prompt),
            Message::user(prompt),
        ];
        let mut full_output: Vec<String> = Vec::new();
        let mut files_modified: HashSet<String> = HashSet::new();
        let mut consecutive_no_tools: u32 = 0;

        debug!(agent_id = %self.agent_id, kind = self.profile.kind.as_str(), "sub-agent start");

        for _turn in 0..self.profile.max_turns {
            if self.is_cancelled() {
                return self.cancelled_result(&full_output);
            }

            self.status("Thinking...");
            let response = match self.client.chat(&messages, Some(&tools)).await {
                Ok(r) => r,
                Err(e) => {
                    return AgentResult {
                        agent_id: self.agent_id.clone(),
                        kind: self.profile.kind,
                        success: false,
                        output: full_output.join("\n"),
                        error: Some(e.to_string()),
                    }
                }
            };

            if let Some(content) = &response.content {
                if !content.is_empty() {
                    full_output.push(content.clone());
                    if self.profile.kind == AgentKind::Plan {
                        self.extract_plan_tasks(content).await;
                    }
                }
            }
            let calls: Vec<ToolCall> = response.tool_calls.clone().unwrap_or_default();
            messages.push(response);

            if calls.is_empty() {
                consecutive_no_tools += 1;

                // Syntax gate just before a natural exit: give the agent
                // another turn to repair its own breakage.
                if self.profile.finish_hooks && !files_modified.is_empty() {
                    let (all_valid, errors) = validate_modified_files(&files_modified).await;
                    if !all_valid && consecutive_no_tools < MAX_FINISH_ATTEMPTS {
                        messages.push(Message::user(format!(
                            "STOP - You have syntax errors in your modified files that must \
                             be fixed:\n\n{}\n\nFix these errors before finishing.",
                            errors.join("\n\n")
                        )));
                        continue;
                    }
                }

                // Pending-task reminder: terminating with open tasks usually
                // means the agent declared victory early.
                if self.profile.finish_hooks && self.has_task_tools(&allowed_lower) {
                    let pending = self.tasks.lock().await.active();
                    if !pending.is_empty() && consecutive_no_tools < 3 {
                        let names: Vec<String> = pending
                            .iter()
                            .take(3)
                            .map(|t| {
                                let subject: String = t.subject.chars().take(30).collect();
                                format!("#{}: {subject}", t.id)
                            })
                            .collect();
                        messages.push(Message::user(format!(
                            "You still have pending tasks: {}. Continue implementing and \
                             mark them complete when done.",
                            names.join(", ")
                        )));
                        continue;
                    }
                }
                break;
            }

            consecutive_no_tools = 0;
            for call in &calls {
                if self.is_cancelled() {
                    return self.cancelled_result(&full_output);
                }
                self.status(&format_tool_label(&call.name, &call.arguments));
                let observation =
                    self.dispatch(call, &mut files_modified, &allowed_lower).await;
                messages.push(Message::tool_result(&call.id, &call.name, observation));
            }
        }

        let output = if full_output.is_empty() {
            self.profile.default_output.to_string()
        } else {
            full_output.join("\n").trim().to_string()
        };

        let output = if self.profile.kind == AgentKind::Plan {
            crate::profiles::plan_summary(
                self.profile.plan_file.as_deref(),
                &self.plan_tasks_created,
                &self.tasks,
            )
            .await
            .unwrap_or(output)
        } else {
            output
        };

        AgentResult {
            agent_id: self.agent_id.clone(),
            kind: self.profile.kind,
            success: true,
            output,
            error: None,
        }
    }

    /// Execute one tool call: allow-list filter, completion gate, registry
    /// dispatch, modification tracking.
    async fn dispatch(
        &mut self,
        call: &ToolCall,
        files_modified: &mut HashSet<String>,
        allowed_lower: &HashSet<String>,
    ) -> String {
        if !allowed_lower.is_empty() && !allowed_lower.contains(&call.name.to_lowercase()) {
            return format!("Error: Tool {} not allowed for this agent", call.name);
        }

        // The completion gate runs BEFORE the registry call: a completion
        // that would lie about the work is refused without executing.
        if self.profile.finish_hooks
            && call.name == "task_update"
            && call.arguments.get("status").and_then(|v| v.as_str()) == Some("completed")
        {
            if files_modified.is_empty() {
                return "Error: Cannot mark task complete - no files have been modified. \
                        Use Edit or Write tools to make changes first."
                    .to_string();
            }
            let (all_valid, errors) = validate_modified_files(files_modified).await;
            if !all_valid {
                return format!(
                    "Error: Cannot mark task complete - files have syntax errors that must \
                     be fixed first:\n\n{}\n\nFix the errors and try again.",
                    errors.join("\n\n")
                );
            }
        }

        let result = self.registry.execute(&call.name, &call.arguments).await;

        if matches!(call.name.as_str(), "edit_file" | "write_file")
            && result.starts_with("Successfully")
        {
            if let Some(path) = call.arguments.get("file_path").and_then(|v| v.as_str()) {
                files_modified.insert(path.to_string());
            }
        }

        if self.profile.kind == AgentKind::Plan
            && call.name == "write_file"
            && result.starts_with("Successfully")
        {
            if let Some(content) = call.arguments.get("content").and_then(|v| v.as_str()) {
                self.extract_plan_tasks(content).await;
            }
        }

        result
    }

    /// Create a task for every checkbox subject not already created this run.
    async fn extract_plan_tasks(&mut self, content: &str) {
        let subjects = extract_checkbox_subjects(content);
        if subjects.is_empty() {
            return;
        }
        let mut tasks = self.tasks.lock().await;
        for subject in subjects {
            if !self.plan_tasks_created.contains(&subject) {
                let truncated: String = subject.chars().take(40).collect();
                tasks.create(
                    &subject,
                    &format!("Plan task: {subject}"),
                    &format!("Working on: {truncated}..."),
                );
                self.plan_tasks_created.push(subject);
            }
        }
    }
}

/// Short status label for a tool call, e.g. `Edit(main.py)`.
pub fn format_tool_label(name: &str, args: &Value) -> String {
    let short_path = |key: &str| {
        args.get(key)
            .and_then(|v| v.as_str())
            .map(|p| p.rsplit('/').next().unwrap_or(p).to_string())
            .unwrap_or_default()
    };
    match name {
        "read_file" => format!("Read({})", short_path("file_path")),
        "write_file" => format!("Write({})", short_path("file_path")),
        "edit_file" => format!("Edit({})", short_path("file_path")),
        "bash" => {
            let cmd = args.get("command").and_then(|v| v.as_str()).unwrap_or("");
            let shown: String = cmd.chars().take(30).collect();
            let ellipsis = if cmd.chars().count() > 30 { "..." } else { "" };
            format!("Bash({shown}{ellipsis})")
        }
        "glob" => format!("Glob({})", args.get("pattern").and_then(|v| v.as_str()).unwrap_or("")),
        "grep" => {
            let pattern = args.get("pattern").and_then(|v| v.as_str()).unwrap_or("");
            let shown: String = pattern.chars().take(20).collect();
            format!("Grep({shown})")
        }
        other => {
            let mut label = String::new();
            for (i, part) in other.split('_').enumerate() {
                if i > 0 {
                    label.push(' ');
                }
                let mut chars = part.chars();
                if let Some(first) = chars.next() {
                    label.extend(first.to_uppercase());
                    label.push_str(chars.as_str());
                }
            }
            label
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

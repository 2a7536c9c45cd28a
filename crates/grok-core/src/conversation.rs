// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Conversation history and system-prompt assembly.
//!
//! The conversation is strictly append-only.  The head is always a system
//! message produced by prompt assembly; `clear` resets to a fresh head and
//! `refresh` replaces the head in place (used to inject current task state
//! before every foreground turn).  No other mutation of existing messages
//! happens anywhere.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use grok_model::{Message, Role, ToolCall};
use grok_runtime::PluginRegistry;
use grok_tools::{Task, TaskStatus, TaskStore};

const SYSTEM_PROMPT: &str = "You are grokCode, an AI coding assistant. You are a senior software engineer.

## Response Style
- Be direct and precise. No filler phrases or excessive enthusiasm.
- Structure complex responses with headings and bullet points.
- Provide complete, working code - never use placeholders.
- Reference file paths when discussing code: `path/file.py:42`
- Explain reasoning for architectural decisions briefly.

## Tools

### File Operations
- `read_file`: Read file contents (always read before editing)
- `write_file`: Create or overwrite files
- `edit_file`: Edit via exact string replacement (provide unique context)
- `glob`: Find files by pattern
- `grep`: Search contents with regex

### Execution
- `bash`: Run shell commands (avoid destructive operations)

### Agents
- `task`: Spawn sub-agents (explore, plan, general)
- `task_output`: Get agent results

### Tasks
- `task_create`, `task_update`, `task_list`, `task_get`: Track work

### Planning
- `enter_plan_mode`: Plan complex implementations before coding
- `write_plan`: Document your approach
- `exit_plan_mode`: Request user approval
- `ask_user`: Clarify requirements

### Web
- `web_fetch`: Fetch URLs
- `web_search`: Search the web

## Guidelines
1. Read files before editing
2. Make edits with unique context strings
3. Use plan mode for complex tasks
4. Use agents for codebase exploration
5. Track multi-step work with tasks

## Plan Task Workflow
When there are active plan tasks, you MUST mark them complete as you implement them:
1. Before starting work, check for pending plan tasks that match the request
2. As you complete each task, use `task_update` to set status to \"completed\"
3. This keeps the plan synchronized with actual progress

Working directory: {cwd}
";

/// Manages conversation history and messages for the foreground loop.
pub struct Conversation {
    messages: Vec<Message>,
    tasks: Arc<Mutex<TaskStore>>,
    plugins: Option<Arc<PluginRegistry>>,
    /// Root for `.grok/` project files; `None` means the working directory.
    base_dir: Option<PathBuf>,
    project_files_loaded: Vec<String>,
}

impl Conversation {
    pub async fn new(tasks: Arc<Mutex<TaskStore>>, plugins: Option<Arc<PluginRegistry>>) -> Self {
        Self::new_in(tasks, plugins, None).await
    }

    /// Construct with an explicit project root (tests point this at a temp
    /// directory).
    pub async fn new_in(
        tasks: Arc<Mutex<TaskStore>>,
        plugins: Option<Arc<PluginRegistry>>,
        base_dir: Option<PathBuf>,
    ) -> Self {
        let mut conversation = Self {
            messages: Vec::new(),
            tasks,
            plugins,
            base_dir,
            project_files_loaded: Vec::new(),
        };
        let system = conversation.assemble_system().await;
        conversation.messages.push(system);
        conversation
    }

    fn project_root(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
    }

    fn read_project_file(&self, filename: &str) -> Option<String> {
        let path = self.project_root().join(".grok").join(filename);
        if path.is_file() {
            std::fs::read_to_string(path).ok()
        } else {
            None
        }
    }

    /// Build the head system message: template(cwd) + available agents +
    /// project files + active tasks.
    async fn assemble_system(&mut self) -> Message {
        let cwd = self.project_root();
        let mut prompt = SYSTEM_PROMPT.replace("{cwd}", &cwd.display().to_string());

        if let Some(plugins) = &self.plugins {
            let agents = plugins.list_agents();
            if !agents.is_empty() {
                prompt.push_str("\n## Available Custom Agents\nSpawn these with the `task` tool:\n");
                for agent in agents {
                    prompt.push_str(&format!("- {}: {}\n", agent.name, agent.description));
                }
            }
        }

        self.project_files_loaded.clear();
        let grok_md = self.read_project_file("GROK.md");
        let workflow_md = self.read_project_file("WORKFLOW.md");
        if grok_md.is_some() || workflow_md.is_some() {
            prompt.push_str("\n\n---\n\n## Project Configuration\n");
        }
        if let Some(text) = grok_md {
            prompt.push_str(&format!("\n### Project Context (.grok/GROK.md)\n{text}\n"));
            self.project_files_loaded.push(".grok/GROK.md".to_string());
        }
        if let Some(text) = workflow_md {
            prompt.push_str(&format!("\n### Workflow Instructions (.grok/WORKFLOW.md)\n{text}\n"));
            self.project_files_loaded.push(".grok/WORKFLOW.md".to_string());
        }

        let active = self.tasks.lock().await.active();
        if let Some(section) = active_tasks_section(&active) {
            prompt.push_str(&format!("\n\n---\n\n{section}\n"));
        }

        Message::system(prompt)
    }

    /// Replace the head system message with a fresh assembly.
    pub async fn refresh(&mut self) {
        let system = self.assemble_system().await;
        if let Some(head) = self.messages.first_mut() {
            if head.role == Role::System {
                *head = system;
                return;
            }
        }
        self.messages.insert(0, system);
    }

    /// Reset the history to a single freshly assembled system message.
    pub async fn clear(&mut self) {
        self.messages.clear();
        let system = self.assemble_system().await;
        self.messages.push(system);
    }

    pub fn add_user_message(&mut self, content: &str) {
        self.messages.push(Message::user(content));
    }

    pub fn add_assistant_message(&mut self, content: Option<String>, tool_calls: Option<Vec<ToolCall>>) {
        self.messages.push(Message {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
            name: None,
        });
    }

    pub fn add_tool_result(&mut self, tool_call_id: &str, name: &str, result: &str) {
        self.messages.push(Message::tool_result(tool_call_id, name, result));
    }

    /// Append a fully-formed message (used when loading transcripts).
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn loaded_project_files(&self) -> &[String] {
        &self.project_files_loaded
    }
}

fn active_tasks_section(tasks: &[Task]) -> Option<String> {
    if tasks.is_empty() {
        return None;
    }
    let mut lines = vec![
        "## Active Plan Tasks".to_string(),
        "Mark these complete with `task_update` as you implement them:".to_string(),
        String::new(),
    ];
    for task in tasks {
        let icon = if task.status == TaskStatus::InProgress { "◐" } else { "☐" };
        lines.push(format!("- {icon} Task #{}: {}", task.id, task.subject));
    }
    Some(lines.join("\n"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::state::{Task, TaskPatch, TaskStatus, TaskStore};
use crate::tool::{opt_str, require_str, Tool};

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "○",
        TaskStatus::InProgress => "◐",
        TaskStatus::Completed => "●",
        TaskStatus::Deleted => "?",
    }
}

pub struct TaskCreateTool {
    tasks: Arc<Mutex<TaskStore>>,
}

impl TaskCreateTool {
    pub fn new(tasks: Arc<Mutex<TaskStore>>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Tool for TaskCreateTool {
    fn name(&self) -> &str {
        "task_create"
    }

    fn description(&self) -> &str {
        "Create a new task to track work. Use for complex multi-step tasks."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "subject": {
                    "type": "string",
                    "description": "Brief title for the task (imperative form, e.g. 'Fix login bug')"
                },
                "description": {
                    "type": "string",
                    "description": "Detailed description of what needs to be done"
                },
                "active_form": {
                    "type": "string",
                    "description": "Present continuous form for status display (e.g. 'Fixing login bug')"
                }
            },
            "required": ["subject", "description"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let subject = match require_str(args, "subject") {
            Ok(s) => s,
            Err(e) => return e,
        };
        let description = match require_str(args, "description") {
            Ok(d) => d,
            Err(e) => return e,
        };
        let active_form = opt_str(args, "active_form").unwrap_or("");

        let task = self.tasks.lock().await.create(subject, description, active_form);
        format!("Task #{} created: {}", task.id, task.subject)
    }
}

pub struct TaskUpdateTool {
    tasks: Arc<Mutex<TaskStore>>,
}

impl TaskUpdateTool {
    pub fn new(tasks: Arc<Mutex<TaskStore>>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Tool for TaskUpdateTool {
    fn name(&self) -> &str {
        "task_update"
    }

    fn description(&self) -> &str {
        "Update a task's status or details. Set status to 'in_progress' when starting, \
         'completed' when done."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "string",
                    "description": "The task ID to update"
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "completed", "deleted"],
                    "description": "New status for the task"
                },
                "subject": {
                    "type": "string",
                    "description": "New subject for the task"
                },
                "description": {
                    "type": "string",
                    "description": "New description"
                },
                "add_blocked_by": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Task IDs that block this task"
                }
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let task_id = match require_str(args, "task_id") {
            Ok(id) => id,
            Err(e) => return e,
        };

        let status = match opt_str(args, "status") {
            Some(s) => match TaskStatus::parse(s) {
                Some(status) => Some(status),
                None => return format!("Error: Invalid status '{s}'"),
            },
            None => None,
        };
        let string_list = |key: &str| -> Vec<String> {
            args.get(key)
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default()
        };
        let patch = TaskPatch {
            status,
            subject: opt_str(args, "subject").map(str::to_string),
            description: opt_str(args, "description").map(str::to_string),
            active_form: opt_str(args, "active_form").map(str::to_string),
            add_blocked_by: string_list("add_blocked_by"),
            add_blocks: string_list("add_blocks"),
        };

        let Some(task) = self.tasks.lock().await.update(task_id, patch) else {
            return format!("Error: Task #{task_id} not found");
        };

        if status == Some(TaskStatus::Deleted) {
            return format!("Task #{task_id} deleted");
        }
        format!("Task #{task_id} updated: {} [{}]", task.subject, task.status.as_str())
    }
}

pub struct TaskListTool {
    tasks: Arc<Mutex<TaskStore>>,
}

impl TaskListTool {
    pub fn new(tasks: Arc<Mutex<TaskStore>>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Tool for TaskListTool {
    fn name(&self) -> &str {
        "task_list"
    }

    fn description(&self) -> &str {
        "List all current tasks with their status"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: &Value) -> String {
        let tasks = self.tasks.lock().await.list_all();
        if tasks.is_empty() {
            return "No tasks found".to_string();
        }
        tasks.iter().map(render_row).collect::<Vec<_>>().join("\n")
    }
}

fn render_row(task: &Task) -> String {
    let blocked = if task.blocked_by.is_empty() {
        String::new()
    } else {
        format!(" (blocked by: {})", task.blocked_by.join(", "))
    };
    format!(
        "#{} {} [{}] {}{}",
        task.id,
        status_icon(task.status),
        task.status.as_str(),
        task.subject,
        blocked
    )
}

pub struct TaskGetTool {
    tasks: Arc<Mutex<TaskStore>>,
}

impl TaskGetTool {
    pub fn new(tasks: Arc<Mutex<TaskStore>>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Tool for TaskGetTool {
    fn name(&self) -> &str {
        "task_get"
    }

    fn description(&self) -> &str {
        "Get full details of a specific task"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "string",
                    "description": "The task ID to retrieve"
                }
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let task_id = match require_str(args, "task_id") {
            Ok(id) => id,
            Err(e) => return e,
        };

        let store = self.tasks.lock().await;
        let Some(task) = store.get(task_id) else {
            return format!("Error: Task #{task_id} not found");
        };

        let mut lines = vec![
            format!("Task #{}: {}", task.id, task.subject),
            format!("Status: {}", task.status.as_str()),
            format!("Description: {}", task.description),
        ];
        if !task.blocked_by.is_empty() {
            lines.push(format!("Blocked by: {}", task.blocked_by.join(", ")));
        }
        if !task.blocks.is_empty() {
            lines.push(format!("Blocks: {}", task.blocks.join(", ")));
        }
        lines.join("\n")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

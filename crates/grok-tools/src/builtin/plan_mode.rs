// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::state::{PlanState, TaskStore};
use crate::tool::{require_str, Tool};

pub struct EnterPlanModeTool {
    plan: Arc<Mutex<PlanState>>,
}

impl EnterPlanModeTool {
    pub fn new(plan: Arc<Mutex<PlanState>>) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl Tool for EnterPlanModeTool {
    fn name(&self) -> &str {
        "enter_plan_mode"
    }

    fn description(&self) -> &str {
        "Enter plan mode for complex implementation tasks. Use this when:\n\
         - Adding new features that need architectural decisions\n\
         - Multiple valid approaches exist\n\
         - Changes affect multiple files\n\
         - Requirements need clarification\n\n\
         In plan mode, explore the codebase, design an approach, and get user approval before \
         implementing."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: &Value) -> String {
        let mut plan = self.plan.lock().await;
        if let Err(e) = plan.enter() {
            return format!("Error: Could not enter plan mode: {e}");
        }
        format!(
            "Entered plan mode.\n\n\
             In plan mode:\n\
             1. Use read_file, glob, grep to explore the codebase\n\
             2. Use the task agent to explore complex areas\n\
             3. Design your implementation approach\n\
             4. Write your plan using write_plan tool (MUST include tasks)\n\
             5. Call exit_plan_mode when ready for user approval\n\n\
             ## Plan Requirements:\n\
             Your plan MUST include a ## Tasks section with checkbox items:\n\
             ```\n\
             ## Tasks\n\
             - [ ] Task 1: Specific actionable task\n\
             - [ ] Task 2: Specific actionable task\n\
             ```\n\n\
             Tasks will be automatically created for tracking when you write the plan.\n\n\
             Plan will be saved to: {}\n\n\
             DO NOT make any edits to code files while in plan mode.",
            plan.plan_file.display()
        )
    }
}

pub struct WritePlanTool {
    plan: Arc<Mutex<PlanState>>,
    tasks: Arc<Mutex<TaskStore>>,
}

impl WritePlanTool {
    pub fn new(plan: Arc<Mutex<PlanState>>, tasks: Arc<Mutex<TaskStore>>) -> Self {
        Self { plan, tasks }
    }
}

#[async_trait]
impl Tool for WritePlanTool {
    fn name(&self) -> &str {
        "write_plan"
    }

    fn description(&self) -> &str {
        "Write or update the implementation plan. Your plan MUST include:\n\n\
         # [Plan Title]\n\n\
         ## Overview\n\
         [1-2 paragraph summary]\n\n\
         ## Files to Modify\n\
         - `path/to/file.py` - [what changes]\n\n\
         ## Tasks\n\
         - [ ] Task 1: [Specific, actionable task]\n\
         - [ ] Task 2: [Specific, actionable task]\n\n\
         Tasks are MANDATORY. Each task must be in `- [ ]` checkbox format. \
         Tasks will be automatically created for tracking."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The plan content in markdown format. MUST include a ## Tasks section with - [ ] checkboxes."
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let content = match require_str(args, "content") {
            Ok(c) => c,
            Err(e) => return e,
        };

        let mut plan = self.plan.lock().await;
        if !plan.active {
            return "Error: Not in plan mode. Call enter_plan_mode first.".to_string();
        }

        if !content.lines().any(|l| l.trim_start().starts_with("- [ ] ")) {
            return "Error: Plan must include tasks in checkbox format.\n\n\
                    Add a ## Tasks section with tasks like:\n\
                    ## Tasks\n\
                    - [ ] Task 1: Description\n\
                    - [ ] Task 2: Description\n\n\
                    Each task should be specific and actionable."
                .to_string();
        }

        let mut tasks = self.tasks.lock().await;
        match plan.set_plan(content, &mut tasks) {
            Ok(created) => format!(
                "Plan saved to {}\n\nCreated {created} task(s) for tracking.",
                plan.plan_file.display()
            ),
            Err(e) => format!("Error: Could not write plan file: {e}"),
        }
    }
}

pub struct ExitPlanModeTool {
    plan: Arc<Mutex<PlanState>>,
    tasks: Arc<Mutex<TaskStore>>,
}

impl ExitPlanModeTool {
    pub fn new(plan: Arc<Mutex<PlanState>>, tasks: Arc<Mutex<TaskStore>>) -> Self {
        Self { plan, tasks }
    }
}

#[async_trait]
impl Tool for ExitPlanModeTool {
    fn name(&self) -> &str {
        "exit_plan_mode"
    }

    fn description(&self) -> &str {
        "Exit plan mode and request user approval for your plan. The user will review your plan \
         before you can proceed with implementation. The plan must have tasks before exiting."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: &Value) -> String {
        let mut plan = self.plan.lock().await;
        if !plan.active {
            return "Error: Not in plan mode.".to_string();
        }
        if plan.plan_content.is_empty() {
            return "Error: No plan was written. Use write_plan to create your plan first."
                .to_string();
        }
        if plan.created_tasks.is_empty() {
            return "Error: Plan has no tasks. Cannot exit plan mode without tasks.\n\n\
                    Your plan must include a ## Tasks section with checkbox items:\n\
                    ## Tasks\n\
                    - [ ] Task 1: Description\n\
                    - [ ] Task 2: Description\n\n\
                    Use write_plan again with proper task format."
                .to_string();
        }

        let tasks = self.tasks.lock().await;
        let all_tasks = tasks.list_all();
        let tasks_info: Vec<String> = plan
            .created_tasks
            .iter()
            .filter_map(|subject| {
                all_tasks
                    .iter()
                    .find(|t| &t.subject == subject)
                    .map(|t| format!("  - #{}: {subject}", t.id))
            })
            .collect();
        drop(tasks);

        let plan_content = plan.plan_content.clone();
        let plan_file = plan.plan_file.clone();
        plan.exit();

        format!(
            "Exiting plan mode.\n\n\
             [PLAN FOR USER APPROVAL]\n\
             {plan_content}\n\
             [END PLAN]\n\n\
             ## Created Tasks:\n\
             {}\n\n\
             Plan saved to: {}\n\n\
             Waiting for user approval. The user should respond with:\n\
             - 'approve' or 'yes' to proceed with implementation\n\
             - 'reject' or 'no' to cancel\n\
             - Feedback/changes to request modifications",
            tasks_info.join("\n"),
            plan_file.display()
        )
    }
}

pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the user a question to clarify requirements or get their preference between options."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask the user"
                },
                "options": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional list of choices for the user"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let question = match require_str(args, "question") {
            Ok(q) => q,
            Err(e) => return e,
        };
        let mut output = format!("[QUESTION FOR USER]\n{question}");
        if let Some(options) = args.get("options").and_then(|v| v.as_array()) {
            if !options.is_empty() {
                output.push_str("\n\nOptions:");
                for (i, opt) in options.iter().filter_map(|v| v.as_str()).enumerate() {
                    output.push_str(&format!("\n  {}. {opt}", i + 1));
                }
            }
        }
        output.push_str("\n[END QUESTION]");
        output
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The agent-spawn tools (`task`, `task_output`), wired to [`AgentRunner`].
//!
//! These are registered only in the foreground registry: sub-agents run
//! against a registry without them, which bounds spawn nesting at one level.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use grok_tools::Tool;

use crate::runner::AgentRunner;

pub struct TaskTool {
    runner: Arc<AgentRunner>,
}

impl TaskTool {
    pub fn new(runner: Arc<AgentRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Launch a sub-agent to handle tasks. Built-in agents:\n\
         - explore: Fast read-only codebase exploration\n\
         - plan: Creates implementation plans with task lists\n\
         - general: Full tool access for implementing features\n\n\
         Also supports custom project agents defined in .grok/agents/ \
         (e.g. \"engineer\", \"code-reviewer\")."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_type": {
                    "type": "string",
                    "description": "Agent to spawn: 'explore', 'plan', 'general', or a custom agent name"
                },
                "prompt": {
                    "type": "string",
                    "description": "The task/prompt for the agent, including any relevant context from the conversation"
                },
                "run_in_background": {
                    "type": "boolean",
                    "description": "If true, run in background and return immediately with the agent ID"
                }
            },
            "required": ["agent_type", "prompt"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        // `subagent_type` is accepted as an alias for `agent_type`.
        let agent_type = args
            .get("subagent_type")
            .or_else(|| args.get("agent_type"))
            .and_then(|v| v.as_str());
        let Some(agent_type) = agent_type else {
            return "Error: Missing required parameter 'agent_type'".to_string();
        };
        let Some(prompt) = args.get("prompt").and_then(|v| v.as_str()) else {
            return "Error: Missing required parameter 'prompt'".to_string();
        };
        let run_in_background =
            args.get("run_in_background").and_then(|v| v.as_bool()).unwrap_or(false);

        if run_in_background {
            let agent_id = self.runner.run_agent_background(agent_type, prompt).await;
            return format!("Agent started in background with ID: {agent_id}");
        }

        let result = self.runner.run_agent(agent_type, prompt).await;
        if result.success {
            result.output
        } else {
            format!(
                "Agent failed: {}\n\nPartial output:\n{}",
                result.error.unwrap_or_else(|| "unknown error".to_string()),
                result.output
            )
        }
    }
}

pub struct TaskOutputTool {
    runner: Arc<AgentRunner>,
}

impl TaskOutputTool {
    pub fn new(runner: Arc<AgentRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for TaskOutputTool {
    fn name(&self) -> &str {
        "task_output"
    }

    fn description(&self) -> &str {
        "Get the output from a background agent by its ID"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": {
                    "type": "string",
                    "description": "The agent ID returned from the task tool"
                },
                "wait": {
                    "type": "boolean",
                    "description": "If true, wait for the agent to complete. Default true."
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds when waiting. Default 60."
                }
            },
            "required": ["agent_id"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let Some(agent_id) = args.get("agent_id").and_then(|v| v.as_str()) else {
            return "Error: Missing required parameter 'agent_id'".to_string();
        };
        let wait = args.get("wait").and_then(|v| v.as_bool()).unwrap_or(true);
        let timeout_secs = args.get("timeout").and_then(|v| v.as_f64()).unwrap_or(60.0);

        if let Some(result) = self.runner.get_result(agent_id).await {
            return format!("Agent completed.\n\n{}", result.output);
        }

        if !self.runner.is_running(agent_id).await {
            return format!("Error: No agent found with ID {agent_id}");
        }

        if !wait {
            return format!("Agent {agent_id} is still running");
        }

        match self.runner.wait_for_agent(agent_id, Duration::from_secs_f64(timeout_secs)).await {
            Some(result) => format!("Agent completed.\n\n{}", result.output),
            None => format!("Agent {agent_id} did not complete within {timeout_secs} seconds"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use grok_model::mock::ScriptedTransport;
    use grok_tools::{SessionStores, ToolRegistry};

    fn make_runner(transport: ScriptedTransport) -> Arc<AgentRunner> {
        let stores = SessionStores::new();
        Arc::new(AgentRunner::new(
            Arc::new(transport),
            Arc::new(ToolRegistry::new()),
            stores.tasks.clone(),
            None,
        ))
    }

    #[tokio::test]
    async fn sync_spawn_returns_agent_output() {
        let runner = make_runner(ScriptedTransport::always_text("exploration notes"));
        let tool = TaskTool::new(runner);
        let out = tool
            .execute(&json!({"agent_type": "explore", "prompt": "find the config loader"}))
            .await;
        assert_eq!(out, "exploration notes");
    }

    #[tokio::test]
    async fn subagent_type_alias_is_accepted() {
        let runner = make_runner(ScriptedTransport::always_text("aliased"));
        let tool = TaskTool::new(runner);
        let out = tool
            .execute(&json!({"subagent_type": "explore", "prompt": "go"}))
            .await;
        assert_eq!(out, "aliased");
    }

    #[tokio::test]
    async fn background_spawn_returns_id_and_output_is_retrievable() {
        let runner = make_runner(ScriptedTransport::always_text("background findings"));
        let task = TaskTool::new(runner.clone());
        let output_tool = TaskOutputTool::new(runner);

        let started = task
            .execute(&json!({
                "agent_type": "explore",
                "prompt": "scan",
                "run_in_background": true
            }))
            .await;
        assert!(started.starts_with("Agent started in background with ID: "), "got: {started}");
        let id = started.rsplit(' ').next().unwrap();

        let out = output_tool.execute(&json!({"agent_id": id})).await;
        assert!(out.starts_with("Agent completed."), "got: {out}");
        assert!(out.contains("background findings"));
    }

    #[tokio::test]
    async fn unknown_agent_id_is_error() {
        let runner = make_runner(ScriptedTransport::always_text("x"));
        let tool = TaskOutputTool::new(runner);
        let out = tool.execute(&json!({"agent_id": "cafebabe"})).await;
        assert_eq!(out, "Error: No agent found with ID cafebabe");
    }

    #[tokio::test]
    async fn missing_arguments_are_errors() {
        let runner = make_runner(ScriptedTransport::always_text("x"));
        let tool = TaskTool::new(runner);
        assert!(tool.execute(&json!({"prompt": "p"})).await.starts_with("Error:"));
        assert!(tool
            .execute(&json!({"agent_type": "explore"}))
            .await
            .starts_with("Error:"));
    }
}

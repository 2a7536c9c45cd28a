// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use grok_config::ToolsConfig;

use crate::policy::PermissionGate;
use crate::state::{BackgroundTasks, BackgroundJob};
use crate::tool::{opt_bool, opt_u64, require_str, Tool};

/// Commands refused outright in every mode — no approval can enable these.
const FATAL_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    ":(){:|:&};:",
    "mkfs.",
    "dd if=/dev/zero",
    "> /dev/sda",
];

/// Cap on how long `bash_output` will block waiting for a job.
const BACKGROUND_WAIT_SECS: u64 = 300;

pub struct BashTool {
    background: Arc<Mutex<BackgroundTasks>>,
    gate: Arc<PermissionGate>,
    cfg: ToolsConfig,
}

impl BashTool {
    pub fn new(
        background: Arc<Mutex<BackgroundTasks>>,
        gate: Arc<PermissionGate>,
        cfg: ToolsConfig,
    ) -> Self {
        Self { background, gate, cfg }
    }

    async fn run_foreground(&self, command: &str, timeout_secs: u64) -> String {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.current_dir(cwd);
        }

        let result = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await;
        match result {
            Ok(Ok(output)) => {
                format_output(&output, self.cfg.bash_output_limit)
            }
            Ok(Err(e)) => format!("Error executing command: {e}"),
            Err(_) => format!("Error: Command timed out after {timeout_secs} seconds"),
        }
    }

    async fn run_background(&self, command: &str, timeout_secs: u64) -> String {
        let id = BackgroundTasks::new_id();
        let job = self.background.lock().await.add(&id, command);
        let command = command.to_string();
        let limit = self.cfg.bash_output_limit;

        tokio::spawn(run_background_job(job, command, timeout_secs, limit));

        format!("Background task started with ID: {id}\nUse bash_output tool to check status.")
    }
}

async fn run_background_job(
    job: Arc<Mutex<BackgroundJob>>,
    command: String,
    timeout_secs: u64,
    limit: usize,
) {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c")
        .arg(&command)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    if let Ok(cwd) = std::env::current_dir() {
        cmd.current_dir(cwd);
    }

    let result = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await;
    let mut job = job.lock().await;
    match result {
        Ok(Ok(output)) => {
            job.output = format_output(&output, limit);
            job.exit_code = output.status.code();
        }
        Ok(Err(e)) => job.output = format!("Error: {e}"),
        Err(_) => job.output = format!("Error: Command timed out after {timeout_secs} seconds"),
    }
    job.completed = true;
}

/// Combine stdout, a `STDERR:` section, and an exit-code line; truncate at
/// the configured byte cap.
fn format_output(output: &std::process::Output, limit: usize) -> String {
    let mut parts: Vec<String> = Vec::new();

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        parts.push(stdout.into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        parts.push(format!("STDERR:\n{stderr}"));
    }
    if output.status.code() != Some(0) {
        parts.push(format!("\nExit code: {}", output.status.code().unwrap_or(-1)));
    }

    let mut result = if parts.is_empty() { "(no output)".to_string() } else { parts.join("\n") };
    if result.len() > limit {
        let total = result.len();
        let mut cut = limit;
        while !result.is_char_boundary(cut) {
            cut -= 1;
        }
        result.truncate(cut);
        result.push_str(&format!("\n\n... (truncated, {total} total characters)"));
    }
    result
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command and return its output. Use for running scripts, git commands, \
         package managers, etc. Avoid destructive operations."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds. Default is 120."
                },
                "run_in_background": {
                    "type": "boolean",
                    "description": "Run command in background and return task ID immediately"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let command = match require_str(args, "command") {
            Ok(c) => c,
            Err(e) => return e,
        };
        let timeout_secs = opt_u64(args, "timeout").unwrap_or(self.cfg.bash_timeout_secs);
        let run_in_background = opt_bool(args, "run_in_background").unwrap_or(false);

        debug!(command = %command, timeout_secs, run_in_background, "bash tool");

        // Fatal patterns are refused before the gate is even consulted.
        let lowered = command.to_lowercase();
        if FATAL_PATTERNS.iter().any(|p| lowered.contains(p)) {
            return "Error: Refusing to execute potentially dangerous command".to_string();
        }

        if let Err(msg) = self.gate.request("bash", args).await {
            return msg;
        }

        if run_in_background {
            self.run_background(command, timeout_secs).await
        } else {
            self.run_foreground(command, timeout_secs).await
        }
    }
}

pub struct BashOutputTool {
    background: Arc<Mutex<BackgroundTasks>>,
}

impl BashOutputTool {
    pub fn new(background: Arc<Mutex<BackgroundTasks>>) -> Self {
        Self { background }
    }
}

#[async_trait]
impl Tool for BashOutputTool {
    fn name(&self) -> &str {
        "bash_output"
    }

    fn description(&self) -> &str {
        "Get output from a background bash command by its task ID"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "string",
                    "description": "The task ID from run_in_background"
                },
                "wait": {
                    "type": "boolean",
                    "description": "Wait for completion if not done. Default true."
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
        let wait = opt_bool(args, "wait").unwrap_or(true);

        let Some(job) = self.background.lock().await.get(task_id) else {
            return format!("Error: No background task found with ID {task_id}");
        };

        if !job.lock().await.completed && wait {
            let waited = tokio::time::timeout(Duration::from_secs(BACKGROUND_WAIT_SECS), async {
                loop {
                    if job.lock().await.completed {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            })
            .await;
            if waited.is_err() {
                return format!("Task {task_id} is still running after 5 minutes");
            }
        }

        let job = job.lock().await;
        if job.completed {
            let status = match job.exit_code {
                Some(code) => format!("Exit code: {code}"),
                None => "Completed".to_string(),
            };
            format!("Task {task_id} - {status}\n\n{}", job.output)
        } else {
            format!("Task {task_id} is still running...")
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

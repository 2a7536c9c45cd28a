// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end scenarios across the registry, stores, permission gate, and
//! the conversation loops, driven by the scripted transport.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use grok_core::{AgentRunner, Controller, Conversation, SubAgent};
use grok_model::mock::ScriptedTransport;
use grok_model::{Message, Role, ToolCall};
use grok_tools::{
    builtin::register_builtins, ApprovalMode, DenyPrompt, PermissionGate, SessionStores,
    TaskStatus, ToolRegistry,
};

struct Harness {
    stores: SessionStores,
    registry: Arc<ToolRegistry>,
    _dir: tempfile::TempDir,
    dir_path: std::path::PathBuf,
}

fn harness(mode: ApprovalMode) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let stores = SessionStores::new();
    // Keep plan files inside the temp dir as well.
    stores.plan.try_lock().unwrap().base_dir = Some(dir.path().to_path_buf());
    let gate = Arc::new(PermissionGate::with_path(
        Arc::new(DenyPrompt),
        dir.path().join("permissions.json"),
    ));
    gate.set_mode(mode);
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, &stores, gate, &grok_config::ToolsConfig::default());
    let dir_path = dir.path().to_path_buf();
    Harness { stores, registry: Arc::new(registry), _dir: dir, dir_path }
}

// ── Scenario: read-before-write ───────────────────────────────────────────────

#[tokio::test]
async fn read_before_write_gates_overwrites() {
    let h = harness(ApprovalMode::Auto);
    let target = h.dir_path.join("x");
    let path = target.to_str().unwrap();

    // Fresh file: write succeeds and reports the byte count.
    let out = h
        .registry
        .execute("write_file", &json!({"file_path": path, "content": "hi"}))
        .await;
    assert!(out.starts_with("Successfully wrote 2 bytes"), "got: {out}");

    // Overwrite without an intervening read is refused; content survives.
    let out = h
        .registry
        .execute("write_file", &json!({"file_path": path, "content": "bye"}))
        .await;
    assert!(out.contains("has not been read first"), "got: {out}");
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "hi");

    // Read, then write: the overwrite goes through.
    let out = h.registry.execute("read_file", &json!({"file_path": path})).await;
    assert!(out.contains("hi"), "got: {out}");
    let out = h
        .registry
        .execute("write_file", &json!({"file_path": path, "content": "bye"}))
        .await;
    assert!(out.starts_with("Successfully wrote 3 bytes"), "got: {out}");
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "bye");
}

// ── Scenario: explore sub-agent refuses edit_file ─────────────────────────────

#[tokio::test]
async fn explore_agent_refuses_edit_and_leaves_files_alone() {
    let h = harness(ApprovalMode::Auto);
    let target = h.dir_path.join("precious.txt");
    std::fs::write(&target, "untouched").unwrap();

    let transport = Arc::new(ScriptedTransport::tool_then_text(
        "c1",
        "edit_file",
        json!({
            "file_path": target.to_str().unwrap(),
            "old_string": "untouched",
            "new_string": "clobbered"
        }),
        "I was not allowed to edit.",
    ));
    let runner = Arc::new(AgentRunner::new(
        transport.clone(),
        h.registry.clone(),
        h.stores.tasks.clone(),
        None,
    ));
    let result = runner.run_agent("explore", "edit that file").await;
    assert!(result.success);

    let requests = transport.requests.lock().unwrap();
    let observation = requests[1]
        .iter()
        .find(|m| m.role == Role::Tool)
        .and_then(|m| m.content.clone())
        .unwrap();
    assert_eq!(observation, "Error: Tool edit_file not allowed for this agent");
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "untouched");
}

// ── Scenario: syntax gate on task completion ──────────────────────────────────

#[tokio::test]
async fn completion_gate_refuses_until_syntax_is_fixed() {
    let h = harness(ApprovalMode::Auto);
    h.stores.tasks.lock().await.create("ship the config", "d", "");

    let target = h.dir_path.join("config.json");
    let path = target.to_str().unwrap().to_string();

    let transport = Arc::new(ScriptedTransport::new(vec![
        // Turn 1: write a file with broken syntax.
        Message::assistant_with_calls(
            None,
            vec![ToolCall {
                id: "c1".into(),
                name: "write_file".into(),
                arguments: json!({"file_path": path, "content": "{\"a\": "}),
            }],
        ),
        // Turn 2: try to complete — must be refused by the gate.
        Message::assistant_with_calls(
            None,
            vec![ToolCall {
                id: "c2".into(),
                name: "task_update".into(),
                arguments: json!({"task_id": "1", "status": "completed"}),
            }],
        ),
        // Turn 3: read the file back (arming the edit).
        Message::assistant_with_calls(
            None,
            vec![ToolCall {
                id: "c3".into(),
                name: "read_file".into(),
                arguments: json!({"file_path": path}),
            }],
        ),
        // Turn 4: repair the syntax.
        Message::assistant_with_calls(
            None,
            vec![ToolCall {
                id: "c4".into(),
                name: "edit_file".into(),
                arguments: json!({
                    "file_path": path,
                    "old_string": "{\"a\": ",
                    "new_string": "{\"a\": 1}"
                }),
            }],
        ),
        // Turn 5: complete again — goes through now.
        Message::assistant_with_calls(
            None,
            vec![ToolCall {
                id: "c5".into(),
                name: "task_update".into(),
                arguments: json!({"task_id": "1", "status": "completed"}),
            }],
        ),
        Message::assistant("all fixed"),
    ]));

    let agent = SubAgent::new(
        grok_core::profiles::general_profile(),
        transport.clone(),
        h.registry.clone(),
        h.stores.tasks.clone(),
    );
    let result = agent.run("finish the task").await;
    assert!(result.success);

    // The refusal observation carried the syntax diagnostic.
    let requests = transport.requests.lock().unwrap();
    let refused = requests[2]
        .iter()
        .rev()
        .find(|m| m.role == Role::Tool)
        .and_then(|m| m.content.clone())
        .unwrap();
    assert!(refused.contains("syntax error"), "got: {refused}");

    // And after the repair the completion stuck.
    let task = h.stores.tasks.lock().await.get("1").cloned().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\"a\": 1}");
}

// ── Scenario: plan mode hand-off ──────────────────────────────────────────────

#[tokio::test]
async fn plan_mode_creates_tasks_for_checkbox_subjects() {
    let h = harness(ApprovalMode::Auto);

    let out = h.registry.execute("enter_plan_mode", &json!({})).await;
    assert!(out.contains("Entered plan mode"), "got: {out}");

    let body = "# Plan\n\n## Overview\nShip it.\n\n## Tasks\n- [ ] A\n- [ ] B\n";
    let out = h.registry.execute("write_plan", &json!({"content": body})).await;
    assert!(out.contains("Created 2 task(s)"), "got: {out}");

    let out = h.registry.execute("exit_plan_mode", &json!({})).await;
    assert!(out.contains("[PLAN FOR USER APPROVAL]"), "got: {out}");

    let tasks = h.stores.tasks.lock().await.list_all();
    let subjects: Vec<(&str, TaskStatus)> =
        tasks.iter().map(|t| (t.subject.as_str(), t.status)).collect();
    assert_eq!(subjects, vec![("A", TaskStatus::Pending), ("B", TaskStatus::Pending)]);
    assert!(!h.stores.plan.lock().await.active);
}

#[tokio::test]
async fn exit_plan_mode_requires_written_plan_and_tasks() {
    let h = harness(ApprovalMode::Auto);
    h.registry.execute("enter_plan_mode", &json!({})).await;

    let out = h.registry.execute("exit_plan_mode", &json!({})).await;
    assert!(out.starts_with("Error:"), "exit without plan must fail: {out}");

    let out = h
        .registry
        .execute("write_plan", &json!({"content": "# Plan\nno checkboxes"}))
        .await;
    assert!(out.starts_with("Error:"), "plan without checkboxes must fail: {out}");
}

// ── Scenario: plan agent task extraction and summary markers ──────────────────

#[tokio::test]
async fn plan_agent_extracts_tasks_and_emits_summary() {
    let h = harness(ApprovalMode::Auto);
    let plan_file = h.dir_path.join("add-cache_plan.md");
    let plan_body = "# Plan\n\n## Overview\nCache expensive lookups.\n\n## Files to Modify\n\
                     - `store.rs` - add cache\n\n## Implementation Tasks\n\
                     - [ ] Add cache struct\n- [ ] Wire cache into lookups\n";

    let profile = grok_core::AgentProfile {
        kind: grok_core::AgentKind::Plan,
        system_prompt: "You plan implementations.".into(),
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
        plan_file: Some(plan_file.clone()),
    };

    let transport = Arc::new(ScriptedTransport::new(vec![
        Message::assistant_with_calls(
            None,
            vec![ToolCall {
                id: "c1".into(),
                name: "write_file".into(),
                arguments: json!({"file_path": plan_file.to_str().unwrap(), "content": plan_body}),
            }],
        ),
        Message::assistant("Plan written."),
    ]));

    let agent = SubAgent::new(profile, transport, h.registry.clone(), h.stores.tasks.clone());
    let result = agent.run("plan a cache layer").await;
    assert!(result.success);

    assert!(result.output.contains("## Overview"), "got: {}", result.output);
    assert!(result.output.contains("Cache expensive lookups."));
    assert!(result.output.contains("@@PLAN_TASK@@ 1|pending|Add cache struct"), "got: {}", result.output);
    assert!(result.output.contains("@@PLAN_TASK@@ 2|pending|Wire cache into lookups"));
    assert!(result.output.contains("Full plan:"), "got: {}", result.output);

    let tasks = h.stores.tasks.lock().await.list_all();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));
}

// ── Scenario: dangerous bash in auto mode ─────────────────────────────────────

#[tokio::test]
async fn dangerous_bash_paths_in_auto_mode() {
    let h = harness(ApprovalMode::Auto);

    // Always-fatal pattern: refused by the built-in refuser.
    let out = h.registry.execute("bash", &json!({"command": "rm -rf /"})).await;
    assert_eq!(out, "Error: Refusing to execute potentially dangerous command");

    // Not fatal, but the classifier demands approval even in auto mode; the
    // deny prompt means it never executes.
    let canary = h.dir_path.join("canary");
    std::fs::write(&canary, "alive").unwrap();
    let cmd = format!("rm -rf ~/Downloads; rm {}", canary.display());
    let out = h.registry.execute("bash", &json!({"command": cmd})).await;
    assert!(out.contains("Permission required"), "got: {out}");
    assert!(out.contains("root or home directory"), "got: {out}");
    assert!(canary.exists(), "gated command must not run");

    // Ordinary commands pass straight through in auto mode.
    let out = h.registry.execute("bash", &json!({"command": "echo fine"})).await;
    assert!(out.contains("fine"));
}

// ── Scenario: full foreground turn over the whole stack ───────────────────────

#[tokio::test]
async fn foreground_turn_executes_calls_and_appends_observations() {
    let h = harness(ApprovalMode::Auto);
    let note = h.dir_path.join("note.txt");
    std::fs::write(&note, "remember this\n").unwrap();

    let transport = Arc::new(ScriptedTransport::new(vec![
        Message::assistant_with_calls(
            Some("let me check".into()),
            vec![ToolCall {
                id: "call_1".into(),
                name: "read_file".into(),
                arguments: json!({"file_path": note.to_str().unwrap()}),
            }],
        ),
        Message::assistant("the note says: remember this"),
    ]));

    let tasks = h.stores.tasks.clone();
    let conversation =
        Conversation::new_in(tasks, None, Some(h.dir_path.clone())).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut controller = Controller::new(transport.clone(), h.registry.clone(), conversation, tx);

    controller.run_turn("what does the note say?").await.unwrap();

    let messages = controller.conversation.messages();
    assert_eq!(messages.len(), 5, "system, user, assistant+call, tool, assistant");
    assert_eq!(messages[3].role, Role::Tool);
    assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
    assert!(messages[3].content.as_deref().unwrap().contains("remember this"));
    assert_eq!(messages[4].content.as_deref(), Some("the note says: remember this"));

    // The read armed the read-set through the whole stack.
    assert!(h.stores.read_files.lock().await.contains(note.to_str().unwrap()));

    let mut saw_started = false;
    let mut saw_finished = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            grok_core::AgentEvent::ToolCallStarted { tool_name, .. } => {
                assert_eq!(tool_name, "read_file");
                saw_started = true;
            }
            grok_core::AgentEvent::ToolCallFinished { tool_name, .. } => {
                assert_eq!(tool_name, "read_file");
                saw_finished = true;
            }
            _ => {}
        }
    }
    assert!(saw_started && saw_finished);
}

// ── Scenario: background agent round trip via the spawn tools ─────────────────

#[tokio::test]
async fn background_agent_output_is_retrievable_via_task_output() {
    let h = harness(ApprovalMode::Auto);
    let transport = Arc::new(ScriptedTransport::always_text("scanned the tree"));
    let runner = Arc::new(AgentRunner::new(
        transport,
        h.registry.clone(),
        h.stores.tasks.clone(),
        None,
    ));
    let task_tool = grok_core::TaskTool::new(runner.clone());
    let output_tool = grok_core::TaskOutputTool::new(runner);

    use grok_tools::Tool;
    let started = task_tool
        .execute(&json!({"agent_type": "explore", "prompt": "scan", "run_in_background": true}))
        .await;
    let id = started.rsplit(' ').next().unwrap();
    let out = output_tool.execute(&json!({"agent_id": id, "timeout": 5.0})).await;
    assert!(out.contains("scanned the tree"), "got: {out}");
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sub-agent lifecycle: creation, synchronous and background execution,
//! result retrieval, and cancellation fan-in.
//!
//! A single cancel signal propagates from the controller: the runner tracks
//! the currently executing agent's cancel flag, and the controller's
//! `cancel_check` predicate is injected into every synchronous run so a
//! foreground interrupt stops the inner loop at its next suspension point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use grok_model::ChatTransport;
use grok_runtime::PluginRegistry;
use grok_tools::{TaskStore, ToolRegistry};

use crate::agent::{AgentResult, SubAgent};
use crate::events::AgentEvent;
use crate::profiles;

struct RunningAgent {
    cancel: Arc<AtomicBool>,
}

pub struct AgentRunner {
    client: Arc<dyn ChatTransport>,
    registry: Arc<ToolRegistry>,
    tasks: Arc<Mutex<TaskStore>>,
    plugins: Option<Arc<PluginRegistry>>,
    events: StdMutex<Option<mpsc::UnboundedSender<AgentEvent>>>,
    cancel_check: StdMutex<Option<Arc<dyn Fn() -> bool + Send + Sync>>>,
    /// Cancel flag of the agent currently running synchronously.
    current_cancel: StdMutex<Option<Arc<AtomicBool>>>,
    running: Mutex<HashMap<String, RunningAgent>>,
    completed: Mutex<HashMap<String, AgentResult>>,
}

impl AgentRunner {
    pub fn new(
        client: Arc<dyn ChatTransport>,
        registry: Arc<ToolRegistry>,
        tasks: Arc<Mutex<TaskStore>>,
        plugins: Option<Arc<PluginRegistry>>,
    ) -> Self {
        Self {
            client,
            registry,
            tasks,
            plugins,
            events: StdMutex::new(None),
            cancel_check: StdMutex::new(None),
            current_cancel: StdMutex::new(None),
            running: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashMap::new()),
        }
    }

    /// Channel for status fan-out from running agents.
    pub fn set_event_channel(&self, tx: mpsc::UnboundedSender<AgentEvent>) {
        *self.events.lock().unwrap() = Some(tx);
    }

    /// Predicate checked by synchronous runs at every suspension point.
    pub fn set_cancel_check(&self, check: Arc<dyn Fn() -> bool + Send + Sync>) {
        *self.cancel_check.lock().unwrap() = Some(check);
    }

    /// Build an agent for the given type name.  Plugin definitions shadow
    /// nothing: they are consulted first, then the built-in kinds; unknown
    /// names fall back to the read-only explorer.
    fn create_agent(&self, agent_type: &str, prompt: &str) -> SubAgent {
        let profile = match &self.plugins {
            Some(plugins) => match plugins.get_agent(agent_type) {
                Some(def) => profiles::plugin_profile(&def),
                None => builtin_profile(agent_type, prompt),
            },
            None => builtin_profile(agent_type, prompt),
        };

        let mut agent = SubAgent::new(
            profile,
            self.client.clone(),
            self.registry.clone(),
            self.tasks.clone(),
        );
        if let Some(tx) = self.events.lock().unwrap().clone() {
            agent.set_status_channel(tx);
        }
        agent
    }

    /// Run an agent to completion and return its result.
    pub async fn run_agent(&self, agent_type: &str, prompt: &str) -> AgentResult {
        let mut agent = self.create_agent(agent_type, prompt);
        if let Some(check) = self.cancel_check.lock().unwrap().clone() {
            agent.set_cancel_check(check);
        }

        let cancel = agent.cancel_handle();
        let agent_id = agent.agent_id.clone();
        *self.current_cancel.lock().unwrap() = Some(cancel);

        debug!(agent_id = %agent_id, agent_type, "running agent synchronously");
        let result = agent.run(prompt).await;

        *self.current_cancel.lock().unwrap() = None;
        self.completed.lock().await.insert(agent_id, result.clone());
        result
    }

    /// Launch an agent in the background; returns its id immediately.
    pub async fn run_agent_background(self: &Arc<Self>, agent_type: &str, prompt: &str) -> String {
        let agent = self.create_agent(agent_type, prompt);
        let agent_id = agent.agent_id.clone();
        let cancel = agent.cancel_handle();

        self.running
            .lock()
            .await
            .insert(agent_id.clone(), RunningAgent { cancel });

        let runner = Arc::clone(self);
        let id_for_task = agent_id.clone();
        let prompt = prompt.to_string();
        tokio::spawn(async move {
            let result = agent.run(&prompt).await;
            runner.completed.lock().await.insert(id_for_task.clone(), result);
            runner.running.lock().await.remove(&id_for_task);
        });

        debug!(agent_id = %agent_id, agent_type, "agent launched in background");
        agent_id
    }

    /// Cancel the agent currently running synchronously, if any.
    pub fn cancel_current(&self) {
        if let Some(cancel) = self.current_cancel.lock().unwrap().as_ref() {
            cancel.store(true, Ordering::Relaxed);
        }
    }

    /// Cancel a background agent by id.
    pub async fn cancel_agent(&self, agent_id: &str) -> bool {
        let mut running = self.running.lock().await;
        match running.remove(agent_id) {
            Some(entry) => {
                entry.cancel.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub async fn get_result(&self, agent_id: &str) -> Option<AgentResult> {
        self.completed.lock().await.get(agent_id).cloned()
    }

    pub async fn running_ids(&self) -> Vec<String> {
        self.running.lock().await.keys().cloned().collect()
    }

    pub async fn is_running(&self, agent_id: &str) -> bool {
        self.running.lock().await.contains_key(agent_id)
    }

    /// Wait for a background agent's result, up to `timeout`.
    pub async fn wait_for_agent(&self, agent_id: &str, timeout: Duration) -> Option<AgentResult> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(result) = self.get_result(agent_id).await {
                return Some(result);
            }
            if !self.is_running(agent_id).await {
                // Not completed and not running: unknown id.
                return None;
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

fn builtin_profile(agent_type: &str, prompt: &str) -> crate::agent::AgentProfile {
    match agent_type {
        "plan" => profiles::plan_profile(prompt),
        "general" => profiles::general_profile(),
        // "explore" and anything unrecognized run read-only.
        _ => profiles::explore_profile(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use grok_model::mock::ScriptedTransport;
    use grok_tools::{DenyPrompt, PermissionGate, SessionStores};

    fn runner_with(transport: ScriptedTransport, dir: &std::path::Path) -> Arc<AgentRunner> {
        let stores = SessionStores::new();
        let gate = Arc::new(PermissionGate::with_path(
            Arc::new(DenyPrompt),
            dir.join("permissions.json"),
        ));
        gate.set_mode(grok_tools::ApprovalMode::Auto);
        let mut reg = ToolRegistry::new();
        grok_tools::builtin::register_builtins(
            &mut reg,
            &stores,
            gate,
            &grok_config::ToolsConfig::default(),
        );
        Arc::new(AgentRunner::new(
            Arc::new(transport),
            Arc::new(reg),
            stores.tasks.clone(),
            None,
        ))
    }

    #[tokio::test]
    async fn sync_run_stores_result() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with(ScriptedTransport::always_text("findings"), dir.path());
        let result = runner.run_agent("explore", "look around").await;
        assert!(result.success);
        assert_eq!(result.output, "findings");
        let stored = runner.get_result(&result.agent_id).await.unwrap();
        assert_eq!(stored.output, "findings");
    }

    #[tokio::test]
    async fn unknown_agent_type_falls_back_to_explore() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with(ScriptedTransport::always_text("ok"), dir.path());
        let result = runner.run_agent("mystery", "do something").await;
        assert_eq!(result.kind, crate::agent::AgentKind::Explore);
    }

    #[tokio::test]
    async fn background_run_returns_id_then_result() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with(ScriptedTransport::always_text("bg output"), dir.path());
        let id = runner.run_agent_background("explore", "explore in bg").await;
        assert_eq!(id.len(), 8);

        let result = runner.wait_for_agent(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.output, "bg output");
        assert!(runner.running_ids().await.is_empty(), "finished agents leave the map");
    }

    #[tokio::test]
    async fn wait_for_unknown_agent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with(ScriptedTransport::always_text("x"), dir.path());
        assert!(runner.wait_for_agent("deadbeef", Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn cancel_check_propagates_to_sync_runs() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with(ScriptedTransport::always_text("never"), dir.path());
        runner.set_cancel_check(Arc::new(|| true));
        let result = runner.run_agent("explore", "x").await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Agent cancelled"));
    }

    #[tokio::test]
    async fn plugin_definitions_take_priority() {
        let dir = tempfile::tempdir().unwrap();
        // A plugin agent named "explore-pro" restricted to grep.
        let plugin_root = dir.path().join("kit");
        std::fs::create_dir_all(plugin_root.join(".grok-plugin")).unwrap();
        std::fs::write(
            plugin_root.join(".grok-plugin/plugin.json"),
            r#"{"name": "kit", "version": "1.0.0", "description": ""}"#,
        )
        .unwrap();
        std::fs::create_dir_all(plugin_root.join("agents")).unwrap();
        std::fs::write(
            plugin_root.join("agents/explore-pro.md"),
            "---\nname: explore-pro\ndescription: better explorer\ntools: grep\n---\nExplore better.",
        )
        .unwrap();
        let plugins = Arc::new(PluginRegistry::new());
        plugins.add_plugin_dir(dir.path().to_path_buf());
        plugins.load_plugins();

        let stores = SessionStores::new();
        let runner = Arc::new(AgentRunner::new(
            Arc::new(ScriptedTransport::always_text("done")),
            Arc::new(ToolRegistry::new()),
            stores.tasks.clone(),
            Some(plugins),
        ));
        let result = runner.run_agent("explore-pro", "go").await;
        assert_eq!(result.kind, crate::agent::AgentKind::Plugin);
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::Write as _;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::{mpsc, Mutex};
use tracing_subscriber::EnvFilter;

use grok_core::{AgentEvent, AgentRunner, Controller, Conversation, TaskOutputTool, TaskTool};
use grok_model::{ChatTransport, GrokClient, TransportError};
use grok_runtime::PluginRegistry;
use grok_tools::{
    builtin::register_builtins, ApprovalAnswer, ApprovalMode, ApprovalPrompt, PermissionGate,
    SessionStores, ToolRegistry,
};

use cli::Cli;

/// Interactive approval prompt on stdin: `y`/`yes`, `a`/`always`, anything
/// else denies.
struct StdinPrompt;

#[async_trait::async_trait]
impl ApprovalPrompt for StdinPrompt {
    async fn ask(
        &self,
        _tool: &str,
        summary: &str,
        danger_reason: Option<&str>,
    ) -> ApprovalAnswer {
        let mut line = format!("\nApproval required: {summary}");
        if let Some(reason) = danger_reason {
            line.push_str(&format!("\n  Reason: {reason}"));
        }
        line.push_str("\n  [y]es / [n]o / [a]lways > ");
        let answer = tokio::task::spawn_blocking(move || {
            print!("{line}");
            let _ = std::io::stdout().flush();
            let mut input = String::new();
            let _ = std::io::stdin().read_line(&mut input);
            input
        })
        .await
        .unwrap_or_default();
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" | "approve" => ApprovalAnswer::Yes,
            "a" | "always" => ApprovalAnswer::Always,
            _ => ApprovalAnswer::No,
        }
    }
}

fn read_input_line() -> Option<String> {
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
        Err(_) => None,
    }
}

/// Render agent events to the terminal.
async fn print_events(mut rx: mpsc::UnboundedReceiver<AgentEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::TextDelta(delta) => {
                print!("{delta}");
                let _ = std::io::stdout().flush();
            }
            AgentEvent::TextComplete(_) => println!(),
            AgentEvent::ToolCallStarted { summary, .. } => println!("  → {summary}"),
            AgentEvent::ToolCallFinished { output, .. } => {
                let first = output.lines().next().unwrap_or("");
                let shown: String = first.chars().take(100).collect();
                println!("    {shown}");
            }
            AgentEvent::AgentStatus { agent_id, status } => {
                println!("  · agent {agent_id}: {status}");
            }
            AgentEvent::Interrupted => println!("\n[interrupted]"),
            AgentEvent::TurnComplete => {}
            AgentEvent::Error(message) => eprintln!("error: {message}"),
        }
    }
}

const HELP: &str = "Commands:
  /mode         Cycle permission mode (auto → approve → manual)
  /agents       List available sub-agents
  /clear        Clear conversation history
  /save         Save the transcript to .grok/history/
  /load <id>    Load a saved transcript
  /help         Show this help
  /quit         Exit";

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    std::process::exit(exit_code);
}

async fn run() -> i32 {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    rustls::crypto::ring::default_provider().install_default().ok();

    let mut config = match grok_config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e:#}");
            return 1;
        }
    };
    if let Some(model) = args.model {
        config.model.name = model;
    }
    if let Some(base_url) = args.base_url {
        config.model.base_url = base_url;
    }
    if let Some(api_key) = args.api_key {
        config.model.api_key = Some(api_key);
    }

    let client: Arc<dyn ChatTransport> = match GrokClient::from_config(&config.model) {
        Ok(c) => Arc::new(c),
        Err(e @ TransportError::MissingApiKey(_)) => {
            eprintln!("error: {e}");
            return 1;
        }
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let cwd = std::env::current_dir().unwrap_or_default();
    let stores = SessionStores::new();
    let gate = Arc::new(PermissionGate::new(Arc::new(StdinPrompt)));
    if let Some(mode) = &args.mode {
        match mode.as_str() {
            "auto" => gate.set_mode(ApprovalMode::Auto),
            "approve" => gate.set_mode(ApprovalMode::Approve),
            "manual" => gate.set_mode(ApprovalMode::Manual),
            other => {
                eprintln!("error: unknown permission mode '{other}'");
                return 1;
            }
        }
    }
    let plugins = Arc::new(PluginRegistry::with_default_dirs(&cwd));

    // Sub-agents run against a registry without the spawn tools, which
    // bounds agent nesting at one level.
    let mut sub_registry = ToolRegistry::new();
    register_builtins(&mut sub_registry, &stores, gate.clone(), &config.tools);
    let sub_registry = Arc::new(sub_registry);

    let runner = Arc::new(AgentRunner::new(
        client.clone(),
        sub_registry,
        stores.tasks.clone(),
        Some(plugins.clone()),
    ));

    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, &stores, gate.clone(), &config.tools);
    registry.register(TaskTool::new(runner.clone()));
    registry.register(TaskOutputTool::new(runner.clone()));
    let registry = Arc::new(registry);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(print_events(events_rx));
    runner.set_event_channel(events_tx.clone());

    let conversation = Conversation::new(stores.tasks.clone(), Some(plugins.clone())).await;
    let controller =
        Arc::new(Mutex::new(Controller::new(client, registry, conversation, events_tx)));

    // One interrupt signal reaches both the foreground loop and the
    // currently executing sub-agent; a second Ctrl-C within 2 s exits.
    let interrupt = controller.lock().await.interrupt_handle();
    {
        let flag = interrupt.clone();
        runner.set_cancel_check(Arc::new(move || flag.load(Ordering::Relaxed)));
    }
    {
        let interrupt = interrupt.clone();
        let runner = runner.clone();
        tokio::spawn(async move {
            let mut last_press: Option<Instant> = None;
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                if let Some(previous) = last_press {
                    if previous.elapsed() < Duration::from_secs(2) {
                        std::process::exit(130);
                    }
                }
                last_press = Some(Instant::now());
                interrupt.store(true, Ordering::Relaxed);
                runner.cancel_current();
            }
        });
    }

    if let Some(prompt) = args.prompt {
        let mut controller = controller.lock().await;
        if let Err(e) = controller.run_turn(&prompt).await {
            eprintln!("error: {e:#}");
            return 1;
        }
        return 0;
    }

    println!("grok-code — model {} ({} mode)", config.model.name, gate.mode().as_str());
    println!("Type /help for commands.\n");

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let line = match tokio::task::spawn_blocking(read_input_line).await {
            Ok(Some(line)) => line,
            _ => return 0,
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        match line.as_str() {
            "/quit" | "/exit" => return 0,
            "/help" => {
                println!("{HELP}");
                continue;
            }
            "/mode" => {
                let mode = gate.cycle_mode();
                println!("permission mode: {}", mode.as_str());
                continue;
            }
            "/agents" => {
                println!("Built-in agents: explore, plan, general");
                for agent in plugins.list_agents() {
                    println!("  {} — {}", agent.name, agent.description);
                }
                continue;
            }
            "/clear" => {
                controller.lock().await.conversation.clear().await;
                stores.reset().await;
                println!("conversation cleared");
                continue;
            }
            "/save" => {
                let controller = controller.lock().await;
                match grok_core::history::save(&cwd, controller.conversation.messages()) {
                    Ok(path) => println!("saved to {}", path.display()),
                    Err(e) => eprintln!("error: {e:#}"),
                }
                continue;
            }
            "/load" => {
                for id in grok_core::history::list(&cwd) {
                    println!("  {id}");
                }
                continue;
            }
            _ => {}
        }

        if let Some(id) = line.strip_prefix("/load ") {
            match grok_core::history::load(&cwd, id.trim()) {
                Ok(messages) => {
                    let mut controller = controller.lock().await;
                    controller.conversation.clear().await;
                    for message in messages {
                        controller.conversation.push(message);
                    }
                    println!("transcript loaded");
                }
                Err(e) => eprintln!("error: {e:#}"),
            }
            continue;
        }

        interrupt.store(false, Ordering::Relaxed);
        let mut controller = controller.lock().await;
        if let Err(e) = controller.run_turn(&line).await {
            eprintln!("error: {e:#}");
        }
        println!();
    }
}

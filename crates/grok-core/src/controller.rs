// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The foreground conversation controller.
//!
//! One user message drives one turn loop: stream the model reply, fan out
//! tool calls through the registry, append observations, repeat until the
//! model stops calling tools.  Interruption is checked before the streaming
//! call, after it, and between tool calls; input that arrives while the turn
//! is busy is queued and drained after the turn settles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc;
use tracing::debug;

use grok_model::{ChatTransport, ToolCall};
use grok_tools::ToolRegistry;

use crate::agent::format_tool_label;
use crate::conversation::Conversation;
use crate::events::AgentEvent;

pub struct Controller {
    client: Arc<dyn ChatTransport>,
    registry: Arc<ToolRegistry>,
    pub conversation: Conversation,
    events: mpsc::UnboundedSender<AgentEvent>,
    interrupt: Arc<AtomicBool>,
    queued: StdMutex<VecDeque<String>>,
}

impl Controller {
    pub fn new(
        client: Arc<dyn ChatTransport>,
        registry: Arc<ToolRegistry>,
        conversation: Conversation,
        events: mpsc::UnboundedSender<AgentEvent>,
    ) -> Self {
        Self {
            client,
            registry,
            conversation,
            events,
            interrupt: Arc::new(AtomicBool::new(false)),
            queued: StdMutex::new(VecDeque::new()),
        }
    }

    /// Shared flag the UI flips to interrupt the current turn.  The same
    /// flag is handed to the agent runner as its `cancel_check` so one
    /// interrupt reaches the foreground loop and the running sub-agent.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    pub fn request_interrupt(&self) {
        self.interrupt.store(true, Ordering::Relaxed);
    }

    /// Buffer input typed while a turn is busy; drained after it settles.
    pub fn queue_input(&self, text: impl Into<String>) {
        self.queued.lock().unwrap().push_back(text.into());
    }

    fn pop_queued(&self) -> Option<String> {
        self.queued.lock().unwrap().pop_front()
    }

    fn take_interrupt(&self) -> bool {
        self.interrupt.swap(false, Ordering::Relaxed)
    }

    /// Process one user message, then any input queued during the turn.
    pub async fn run_turn(&mut self, user_input: &str) -> anyhow::Result<()> {
        let mut pending = Some(user_input.to_string());
        while let Some(input) = pending.take() {
            self.conversation.add_user_message(&input);
            self.turn_loop().await?;
            let _ = self.events.send(AgentEvent::TurnComplete);
            pending = self.pop_queued();
        }
        Ok(())
    }

    async fn turn_loop(&mut self) -> anyhow::Result<()> {
        // Re-assemble the head system message so the model sees current
        // task state on every turn.
        self.conversation.refresh().await;
        let tools = self.registry.schemas();

        loop {
            if self.take_interrupt() {
                let _ = self.events.send(AgentEvent::Interrupted);
                return Ok(());
            }

            let events = self.events.clone();
            let mut on_content = move |delta: &str| {
                let _ = events.send(AgentEvent::TextDelta(delta.to_string()));
            };
            let response = self
                .client
                .chat_stream(self.conversation.messages(), Some(&tools), &mut on_content)
                .await?;

            // An interrupt raised while streaming discards the reply.
            if self.take_interrupt() {
                let _ = self.events.send(AgentEvent::Interrupted);
                return Ok(());
            }

            if let Some(content) = &response.content {
                if !content.is_empty() {
                    let _ = self.events.send(AgentEvent::TextComplete(content.clone()));
                }
            }

            let calls: Vec<ToolCall> = response.tool_calls.clone().unwrap_or_default();
            self.conversation
                .add_assistant_message(response.content.clone(), response.tool_calls.clone());

            if calls.is_empty() {
                return Ok(());
            }

            for call in &calls {
                if self.take_interrupt() {
                    let _ = self.events.send(AgentEvent::Interrupted);
                    return Ok(());
                }
                debug!(tool = %call.name, call_id = %call.id, "dispatching tool call");
                let _ = self.events.send(AgentEvent::ToolCallStarted {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    summary: format_tool_label(&call.name, &call.arguments),
                });

                let result = self.registry.execute(&call.name, &call.arguments).await;

                let _ = self.events.send(AgentEvent::ToolCallFinished {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output: result.clone(),
                });
                self.conversation.add_tool_result(&call.id, &call.name, &result);
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

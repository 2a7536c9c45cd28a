// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic transports for tests.
//!
//! [`ScriptedTransport`] pops one pre-built assistant message per call so
//! loop tests can specify exact reply sequences — including tool calls —
//! without network access.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{ChatTransport, ContentSink};
use crate::types::{Message, ToolCall};

/// A pre-scripted transport.  Each call to `chat` / `chat_stream` pops the
/// next assistant message from the front of the queue; when the queue runs
/// dry a plain text fallback is returned so loops always terminate.
pub struct ScriptedTransport {
    scripts: Mutex<Vec<Message>>,
    /// Every request's message list, captured for assertions.
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Message>) -> Self {
        Self { scripts: Mutex::new(scripts), requests: Mutex::new(Vec::new()) }
    }

    /// Convenience: a transport that always answers with a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![Message::assistant(reply)])
    }

    /// Convenience: one tool call followed by a text reply.
    pub fn tool_then_text(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        arguments: Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            Message::assistant_with_calls(
                None,
                vec![ToolCall { id: call_id.into(), name: tool.into(), arguments }],
            ),
            Message::assistant(final_text),
        ])
    }

    fn next(&self, messages: &[Message]) -> Message {
        self.requests.lock().unwrap().push(messages.to_vec());
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            Message::assistant("[no more scripts]")
        } else {
            scripts.remove(0)
        }
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: Option<&[Value]>,
    ) -> anyhow::Result<Message> {
        Ok(self.next(messages))
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        _tools: Option<&[Value]>,
        on_content: ContentSink<'_>,
    ) -> anyhow::Result<Message> {
        let msg = self.next(messages);
        if let Some(content) = &msg.content {
            on_content(content);
        }
        Ok(msg)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` holds the already-parsed JSON object; the wire format carries
/// it as a JSON-encoded string (see [`build_wire_messages`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque identifier assigned by the model, forwarded verbatim.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A single message in the conversation history.
///
/// Tool-role messages carry `tool_call_id` and `name`; assistant messages
/// may carry `tool_calls`.  A conversation is strictly append-only: every
/// assistant message with k tool calls must be followed by k tool messages
/// with matching ids before the next assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(text.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(text.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(text.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Assistant message carrying tool calls (content may be empty).
    pub fn assistant_with_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
            name: None,
        }
    }

    /// Tool observation answering the call with the given id.
    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(result.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(tool_name.into()),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
    }
}

/// Serialize messages into the chat-completions wire format.
///
/// Rules: `role` always; `content` only when non-null; `tool_calls` encoded
/// as `{id, type: "function", function: {name, arguments: <JSON string>}}`;
/// tool-role messages carry `tool_call_id` and `name`.
///
/// Extracted as a free function so it can be unit-tested without making HTTP
/// requests.
pub fn build_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut obj = json!({ "role": m.role.as_str() });
            if let Some(content) = &m.content {
                obj["content"] = json!(content);
            }
            if let Some(calls) = &m.tool_calls {
                if !calls.is_empty() {
                    let wire_calls: Vec<Value> = calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    obj["tool_calls"] = json!(wire_calls);
                }
            }
            if let Some(id) = &m.tool_call_id {
                obj["tool_call_id"] = json!(id);
            }
            if let Some(name) = &m.name {
                obj["name"] = json!(name);
            }
            obj
        })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

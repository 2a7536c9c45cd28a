// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP client for the xAI chat completions endpoint.
//!
//! Two operations: [`ChatTransport::chat`] (blocking completion) and
//! [`ChatTransport::chat_stream`] (SSE streaming with a content callback).
//! Streaming assembles tool-call fragments keyed by index, retries
//! connection-level failures with linear backoff, and preserves partial
//! content when every retry fails.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use grok_config::ModelConfig;

use crate::sse::{drain_complete_sse_lines, SseEvent};
use crate::types::{build_wire_messages, Message, Role, ToolCall};
use crate::unescape::unescape_html_value;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("API key not found. Set {0} as an environment variable or put it in the config.")]
    MissingApiKey(String),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("API connection failed after {attempts} attempts: {detail}")]
    Connection { attempts: u32, detail: String },
}

/// Callback invoked with each streamed content delta.
pub type ContentSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// The conversation loops talk to the model through this trait so tests can
/// substitute a scripted implementation (see [`crate::mock`]).
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a chat request and wait for the complete response.
    async fn chat(&self, messages: &[Message], tools: Option<&[Value]>)
        -> anyhow::Result<Message>;

    /// Send a chat request, streaming content deltas through `on_content`.
    /// Returns the fully assembled assistant message.
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: Option<&[Value]>,
        on_content: ContentSink<'_>,
    ) -> anyhow::Result<Message>;
}

#[derive(Debug)]
pub struct GrokClient {
    model: String,
    temperature: f32,
    max_retries: u32,
    chat_url: String,
    client: reqwest::Client,
}

impl GrokClient {
    /// Build a client from config.  Fails when no API key can be resolved.
    pub fn from_config(cfg: &ModelConfig) -> Result<Self, TransportError> {
        let api_key = cfg
            .resolve_api_key()
            .ok_or_else(|| TransportError::MissingApiKey(cfg.api_key_env.clone()))?;

        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| TransportError::MissingApiKey(cfg.api_key_env.clone()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .expect("reqwest client construction is infallible with static options");

        Ok(Self {
            model: cfg.name.clone(),
            temperature: cfg.temperature,
            max_retries: cfg.max_retries,
            chat_url: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn request_body(&self, messages: &[Message], tools: Option<&[Value]>, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": build_wire_messages(messages),
            "temperature": self.temperature,
        });
        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = json!(tools);
            }
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    /// Run one streaming attempt to completion.
    ///
    /// Content deltas accumulate in `content` and are forwarded through
    /// `on_content`; tool-call fragments merge into `pending` keyed by index.
    /// A connection-level failure returns `Err` with the partial state left
    /// in place so the caller can decide whether to retry or salvage it.
    async fn stream_attempt(
        &self,
        body: &Value,
        on_content: &mut (dyn FnMut(&str) + Send),
        content: &mut String,
        pending: &mut BTreeMap<u32, PendingToolCall>,
    ) -> Result<(), AttemptError> {
        let resp = self
            .client
            .post(&self.chat_url)
            .json(body)
            .send()
            .await
            .map_err(AttemptError::connection)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AttemptError::Fatal(TransportError::Status {
                status: status.as_u16(),
                body: text,
            }));
        }

        let mut byte_stream = resp.bytes_stream();
        let mut line_buf = String::new();
        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(AttemptError::connection)?;
            line_buf.push_str(&String::from_utf8_lossy(&bytes));
            for event in drain_complete_sse_lines(&mut line_buf) {
                match event {
                    SseEvent::Content(delta) => {
                        content.push_str(&delta);
                        on_content(&delta);
                    }
                    SseEvent::ToolCallFragment { index, id, name, arguments } => {
                        let ptc = pending.entry(index).or_default();
                        if !id.is_empty() {
                            ptc.id = id;
                        }
                        if !name.is_empty() {
                            ptc.name = name;
                        }
                        ptc.args_buf.push_str(&arguments);
                    }
                    SseEvent::Done => return Ok(()),
                }
            }
        }
        // Stream ended without [DONE]; treat what arrived as complete.
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for GrokClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[Value]>,
    ) -> anyhow::Result<Message> {
        let body = self.request_body(messages, tools, false);
        debug!(model = %self.model, message_count = messages.len(), "chat request");

        let resp = self.client.post(&self.chat_url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), body: text }.into());
        }

        let data: Value = resp.json().await?;
        let msg = &data["choices"][0]["message"];

        let tool_calls = msg.get("tool_calls").and_then(|t| t.as_array()).map(|calls| {
            calls
                .iter()
                .map(|tc| ToolCall {
                    id: tc["id"].as_str().unwrap_or("").to_string(),
                    name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                    arguments: parse_arguments(tc["function"]["arguments"].as_str().unwrap_or("")),
                })
                .collect::<Vec<_>>()
        });

        Ok(Message {
            role: Role::Assistant,
            content: msg.get("content").and_then(|c| c.as_str()).map(str::to_string),
            tool_calls: tool_calls.filter(|c| !c.is_empty()),
            tool_call_id: None,
            name: None,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: Option<&[Value]>,
        on_content: ContentSink<'_>,
    ) -> anyhow::Result<Message> {
        let body = self.request_body(messages, tools, true);
        debug!(model = %self.model, message_count = messages.len(), "chat stream request");

        let attempts = self.max_retries + 1;
        let mut last_partial = String::new();
        let mut last_error = String::new();

        for attempt in 0..attempts {
            // Retries restart the stream: partial state from a failed attempt
            // is never merged into the next one.
            let mut content = String::new();
            let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();

            match self.stream_attempt(&body, on_content, &mut content, &mut pending).await {
                Ok(()) => {
                    let tool_calls: Vec<ToolCall> =
                        pending.into_values().map(PendingToolCall::finish).collect();
                    return Ok(Message {
                        role: Role::Assistant,
                        content: if content.is_empty() { None } else { Some(content) },
                        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                        tool_call_id: None,
                        name: None,
                    });
                }
                Err(AttemptError::Fatal(e)) => return Err(e.into()),
                Err(AttemptError::Connection(detail)) => {
                    warn!(attempt, %detail, "stream attempt failed");
                    last_partial = content;
                    last_error = detail;
                    if attempt + 1 < attempts {
                        tokio::time::sleep(Duration::from_secs((attempt + 1) as u64)).await;
                    }
                }
            }
        }

        if !last_partial.is_empty() {
            return Ok(Message::assistant(format!(
                "{last_partial}\n\n[Response interrupted - connection error]"
            )));
        }
        Err(TransportError::Connection { attempts, detail: last_error }.into())
    }
}

enum AttemptError {
    /// Connection-level failure (reset, read error, connect failure) — retried.
    Connection(String),
    /// Non-retryable failure (HTTP status error).
    Fatal(TransportError),
}

impl AttemptError {
    fn connection(e: reqwest::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

impl PendingToolCall {
    fn finish(self) -> ToolCall {
        ToolCall {
            id: self.id,
            name: self.name,
            arguments: parse_arguments(&self.args_buf),
        }
    }
}

/// Parse an accumulated arguments string.  Empty or malformed input resolves
/// to `{}` so the call can still be dispatched; every string field is
/// HTML-unescaped (the endpoint double-encodes characters in tool arguments).
fn parse_arguments(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(v) => unescape_html_value(v),
        Err(e) => {
            warn!(error = %e, "tool call carried invalid JSON arguments; substituting {{}}");
            Value::Object(Default::default())
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

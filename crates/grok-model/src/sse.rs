// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! SSE decoding for the streaming chat endpoint.
//!
//! The endpoint emits `data: <json>` lines terminated by `data: [DONE]`.
//! A single SSE event can be split across TCP packets, so decoding keeps a
//! persistent line buffer: only complete `\n`-terminated lines are parsed,
//! and a trailing partial line waits for the next chunk.

use serde_json::Value;

/// One decoded event from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A text content delta.
    Content(String),
    /// A tool-call fragment.  `index` routes accumulation: `id` and `name`
    /// are latched the first time they appear non-empty, `arguments` is
    /// concatenated across fragments.
    ToolCallFragment {
        index: u32,
        id: String,
        name: String,
        arguments: String,
    },
    /// The `data: [DONE]` sentinel.
    Done,
}

/// Drain all complete `\n`-terminated SSE lines from `buf`.
///
/// Any trailing incomplete line is left in `buf` so it can be extended by
/// the next TCP chunk.
pub fn drain_complete_sse_lines(buf: &mut String) -> Vec<SseEvent> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        events.extend(parse_sse_data_line(&line));
    }
    events
}

/// Parse a single complete SSE line into events.
///
/// Lines not starting with `data: ` are ignored (comments, empty keepalives).
/// Unparseable JSON payloads are skipped rather than aborting the stream.
fn parse_sse_data_line(line: &str) -> Vec<SseEvent> {
    let Some(data) = line.strip_prefix("data: ") else {
        return vec![];
    };
    let data = data.trim();
    if data.is_empty() {
        return vec![];
    }
    if data == "[DONE]" {
        return vec![SseEvent::Done];
    }
    let Ok(v) = serde_json::from_str::<Value>(data) else {
        return vec![];
    };
    parse_chunk(&v)
}

/// Decode one parsed delta chunk.  A chunk may carry a content delta and
/// several tool-call fragments at once.
fn parse_chunk(v: &Value) -> Vec<SseEvent> {
    let delta = &v["choices"][0]["delta"];
    let mut events = Vec::new();

    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            events.push(SseEvent::Content(text.to_string()));
        }
    }

    if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
        for tc in tool_calls {
            let index = tc["index"].as_u64().unwrap_or(0) as u32;
            let id = tc["id"].as_str().unwrap_or("").to_string();
            let name = tc["function"]["name"].as_str().unwrap_or("").to_string();
            let arguments = tc["function"]["arguments"].as_str().unwrap_or("").to_string();
            events.push(SseEvent::ToolCallFragment { index, id, name, arguments });
        }
    }

    events
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

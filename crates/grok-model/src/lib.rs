// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod client;
pub mod mock;
mod sse;
mod types;
mod unescape;

pub use client::{ChatTransport, ContentSink, GrokClient, TransportError};
pub use sse::{drain_complete_sse_lines, SseEvent};
pub use types::{build_wire_messages, Message, Role, ToolCall};
pub use unescape::unescape_html_value;

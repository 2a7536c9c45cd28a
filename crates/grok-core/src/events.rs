// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Events emitted by the conversation loops.
/// Consumers (the REPL, tests) subscribe to these to drive their output.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A text chunk streamed from the model.
    TextDelta(String),
    /// A complete assistant text response (after streaming finishes).
    TextComplete(String),
    /// A tool call is about to execute.
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        summary: String,
    },
    /// A tool call finished; `output` is the observation string.
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
    },
    /// Status line from a running sub-agent.
    AgentStatus { agent_id: String, status: String },
    /// The current user turn was interrupted before completion.
    Interrupted,
    /// The foreground loop finished the current user turn.
    TurnComplete,
    /// A recoverable error the UI should surface.
    Error(String),
}

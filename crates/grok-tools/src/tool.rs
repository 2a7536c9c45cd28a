// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// Trait that every built-in tool implements.
///
/// Tools take the model's untyped argument map and return a plain string.
/// Failures are encoded as strings starting with `Error:` — callers
/// distinguish outcomes by prefix, never by unwinding.  The model reads
/// these observations on its next turn and may retry.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the argument object.
    fn parameters_schema(&self) -> Value;
    /// Execute with the parsed argument map.
    async fn execute(&self, args: &Value) -> String;
}

/// Bind a required string argument or produce the standard error string.
pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Error: Missing required parameter '{key}'"))
}

pub(crate) fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

pub(crate) fn opt_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(|v| v.as_u64())
}

pub(crate) fn opt_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(|v| v.as_bool())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::tool::Tool;

/// Central registry holding all available tools.
///
/// Immutable after construction: registration happens during wiring, then
/// the registry is shared behind an `Arc` by every conversation loop.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Chat-endpoint schemas for all registered tools, sorted by name.
    pub fn schemas(&self) -> Vec<Value> {
        let mut tools: Vec<&Arc<dyn Tool>> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
            .into_iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    }
                })
            })
            .collect()
    }

    /// Dispatch a call by name.  Unknown names and panicking tools both come
    /// back as `Error:` strings — the registry never unwinds into the loop.
    pub async fn execute(&self, name: &str, args: &Value) -> String {
        let Some(tool) = self.get(name) else {
            return format!("Error: Unknown tool '{name}'");
        };
        let args = args.clone();
        // Run in a task of its own so a panic inside one tool is isolated
        // and surfaces as an observation instead of tearing the loop down.
        let handle = tokio::spawn(async move { tool.execute(&args).await });
        match handle.await {
            Ok(result) => result,
            Err(e) => format!("Error executing {name}: {e}"),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

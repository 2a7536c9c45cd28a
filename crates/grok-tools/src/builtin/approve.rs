// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::policy::PermissionGate;
use crate::tool::{opt_bool, opt_str, require_str, Tool};

pub struct ApproveOperationTool {
    gate: Arc<PermissionGate>,
}

impl ApproveOperationTool {
    pub fn new(gate: Arc<PermissionGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Tool for ApproveOperationTool {
    fn name(&self) -> &str {
        "approve_operation"
    }

    fn description(&self) -> &str {
        "Approve a dangerous operation that requires permission. Use this when a tool returns \
         a permission required message. The user must explicitly confirm they want to proceed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool": {
                    "type": "string",
                    "description": "The tool name (e.g. 'bash', 'write_file')"
                },
                "pattern": {
                    "type": "string",
                    "description": "The pattern to approve (from the permission message)"
                },
                "approve_all": {
                    "type": "boolean",
                    "description": "Approve all similar operations for this session"
                }
            },
            "required": ["tool"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let tool = match require_str(args, "tool") {
            Ok(t) => t,
            Err(e) => return e,
        };
        let pattern = opt_str(args, "pattern").unwrap_or("");
        let approve_all = opt_bool(args, "approve_all").unwrap_or(false);

        if approve_all {
            self.gate.approve_all_for_tool(tool);
            return format!(
                "Approved all permission-requiring operations for '{tool}' tool this session"
            );
        }

        if !pattern.is_empty() {
            self.gate.approve(tool, pattern, false);
            return format!("Approved pattern for '{tool}' tool: {pattern}");
        }

        "[APPROVAL REQUEST]\n\
         The assistant is requesting permission for a potentially dangerous operation.\n\n\
         Please respond with:\n\
         - 'yes' or 'approve' to allow this operation\n\
         - 'no' or 'deny' to block it\n\
         - 'always' to approve all similar operations this session\n\n\
         [END APPROVAL REQUEST]"
            .to_string()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

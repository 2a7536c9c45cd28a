// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod approve;
pub mod bash;
pub mod edit_file;
pub mod glob;
pub mod grep;
pub mod plan_mode;
pub mod read_file;
pub mod tasks;
pub mod web_fetch;
pub mod web_search;
pub mod write_file;

use std::sync::Arc;

use grok_config::ToolsConfig;

use crate::policy::PermissionGate;
use crate::registry::ToolRegistry;
use crate::state::SessionStores;

/// Register the full builtin suite against shared session state.
///
/// The agent-spawn tools are wired separately by the orchestration layer;
/// everything else an agent can call lives here.
pub fn register_builtins(
    reg: &mut ToolRegistry,
    stores: &SessionStores,
    gate: Arc<PermissionGate>,
    cfg: &ToolsConfig,
) {
    reg.register(read_file::ReadTool::new(stores.read_files.clone()));
    reg.register(write_file::WriteTool::new(stores.read_files.clone(), gate.clone()));
    reg.register(edit_file::EditTool::new(stores.read_files.clone(), gate.clone()));
    reg.register(glob::GlobTool);
    reg.register(grep::GrepTool);
    reg.register(bash::BashTool::new(stores.background.clone(), gate.clone(), cfg.clone()));
    reg.register(bash::BashOutputTool::new(stores.background.clone()));
    reg.register(tasks::TaskCreateTool::new(stores.tasks.clone()));
    reg.register(tasks::TaskUpdateTool::new(stores.tasks.clone()));
    reg.register(tasks::TaskListTool::new(stores.tasks.clone()));
    reg.register(tasks::TaskGetTool::new(stores.tasks.clone()));
    reg.register(plan_mode::EnterPlanModeTool::new(stores.plan.clone()));
    reg.register(plan_mode::WritePlanTool::new(stores.plan.clone(), stores.tasks.clone()));
    reg.register(plan_mode::ExitPlanModeTool::new(stores.plan.clone(), stores.tasks.clone()));
    reg.register(plan_mode::AskUserTool);
    reg.register(web_fetch::WebFetchTool::new(cfg.web_fetch_timeout_secs));
    reg.register(web_search::WebSearchTool::new(cfg.web_search_timeout_secs));
    reg.register(approve::ApproveOperationTool::new(gate));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DenyPrompt;

    #[test]
    fn all_builtin_tools_register() {
        let mut reg = ToolRegistry::new();
        let stores = SessionStores::new();
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(PermissionGate::with_path(
            Arc::new(DenyPrompt),
            dir.path().join("permissions.json"),
        ));
        register_builtins(&mut reg, &stores, gate, &ToolsConfig::default());

        for name in [
            "read_file",
            "write_file",
            "edit_file",
            "glob",
            "grep",
            "bash",
            "bash_output",
            "task_create",
            "task_update",
            "task_list",
            "task_get",
            "enter_plan_mode",
            "write_plan",
            "exit_plan_mode",
            "ask_user",
            "web_fetch",
            "web_search",
            "approve_operation",
        ] {
            assert!(reg.get(name).is_some(), "missing builtin tool {name}");
        }
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod policy;
pub mod registry;
pub mod state;
pub mod tool;

pub use policy::{
    format_tool_for_approval, ApprovalAnswer, ApprovalMode, ApprovalPrompt, Decision, DenyPrompt,
    PermissionGate,
};
pub use registry::ToolRegistry;
pub use state::{
    resolve_path, BackgroundJob, BackgroundTasks, PlanState, ReadSet, SessionStores, Task,
    TaskPatch, TaskStatus, TaskStore,
};
pub use tool::Tool;

pub use builtin::approve::ApproveOperationTool;
pub use builtin::bash::{BashOutputTool, BashTool};
pub use builtin::edit_file::EditTool;
pub use builtin::glob::GlobTool;
pub use builtin::grep::GrepTool;
pub use builtin::plan_mode::{AskUserTool, EnterPlanModeTool, ExitPlanModeTool, WritePlanTool};
pub use builtin::read_file::ReadTool;
pub use builtin::tasks::{TaskCreateTool, TaskGetTool, TaskListTool, TaskUpdateTool};
pub use builtin::web_fetch::WebFetchTool;
pub use builtin::web_search::WebSearchTool;
pub use builtin::write_file::WriteTool;

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Permission gate for mutating tools.
//!
//! Three modes: `auto` (only always-dangerous operations need approval),
//! `approve` (writes and bash need approval), `manual` (everything needs
//! approval).  A fixed classifier flags commands and paths that require
//! approval in every mode.  Approvals are remembered under a deliberately
//! coarse key — the first bash token, or the parent directory plus `/*` for
//! file writes — so one `always` answer covers a class of similar calls.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Bash command patterns that always require approval regardless of mode.
const DANGEROUS_BASH_PATTERNS: &[(&str, &str)] = &[
    (r"rm\s+-rf?\s+[/~]", "Recursive delete in root or home directory"),
    (r"rm\s+-rf?\s+\*", "Recursive delete with wildcard"),
    (r"rm\s+-rf?\s+\.\.", "Recursive delete of parent directory"),
    (r"sudo\s+rm\b", "Sudo remove command"),
    (r":\(\)\s*\{", "Fork bomb pattern"),
    (r"mkfs\.", "Filesystem formatting command"),
    (r"dd\s+if=/dev/", "Raw disk write"),
    (r"chmod\s+-R\s+777", "Recursive chmod 777"),
    (r"chown\s+-R\s+root", "Recursive chown to root"),
    (r"git\s+push\s+.*--force", "Force push to git"),
    (r"git\s+reset\s+--hard", "Hard reset git"),
    (r"git\s+clean\s+-fd", "Clean untracked files"),
    (r"drop\s+database", "Drop database"),
    (r"drop\s+table", "Drop table"),
    (r"truncate\s+table", "Truncate table"),
    (r">\s*/dev/sd[a-z]", "Write to block device"),
];

/// File paths that always require approval when written.
const DANGEROUS_FILE_PATTERNS: &[(&str, &str)] = &[
    (r"^/(etc|sys|proc|dev|boot)/", "Write to system directory"),
    (r"\.ssh/", "Write to SSH directory"),
    (r"\.aws/", "Write to AWS credentials"),
    (r"\.env$", "Write to environment file"),
    (r"credentials", "Write to credentials file"),
    (r"\.pem$", "Write to PEM key file"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Auto-accept everything except dangerous operations.
    Auto,
    /// Writes and bash require approval.
    Approve,
    /// Everything requires approval.
    Manual,
}

impl ApprovalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalMode::Auto => "auto",
            ApprovalMode::Approve => "approve",
            ApprovalMode::Manual => "manual",
        }
    }

    /// Next mode in the UI cycle: auto → approve → manual → auto.
    pub fn next(&self) -> Self {
        match self {
            ApprovalMode::Auto => ApprovalMode::Approve,
            ApprovalMode::Approve => ApprovalMode::Manual,
            ApprovalMode::Manual => ApprovalMode::Auto,
        }
    }
}

/// Outcome of a gate check.
#[derive(Debug, Clone)]
pub struct Decision {
    /// True when the call may proceed without asking.
    pub allowed: bool,
    /// Set when the dangerous classifier matched; such calls always need
    /// approval regardless of mode.
    pub danger_reason: Option<String>,
    /// The coarse key under which an `always` answer is remembered.
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAnswer {
    Yes,
    No,
    Always,
}

/// The UI side of an approval request.  The REPL installs an interactive
/// prompt; headless runs keep the default, which denies so the model sees a
/// policy-error observation instead of hanging.
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn ask(&self, tool: &str, summary: &str, danger_reason: Option<&str>) -> ApprovalAnswer;
}

/// Default prompt: deny everything.
pub struct DenyPrompt;

#[async_trait]
impl ApprovalPrompt for DenyPrompt {
    async fn ask(&self, _tool: &str, _summary: &str, _danger: Option<&str>) -> ApprovalAnswer {
        ApprovalAnswer::No
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedPermissions {
    mode: Option<ApprovalMode>,
    #[serde(default)]
    approvals: HashMap<String, Vec<String>>,
}

struct GateState {
    mode: ApprovalMode,
    /// tool → approved keys (this session only).
    session: HashMap<String, HashSet<String>>,
    /// tool → approved keys persisted to disk.
    persistent: HashMap<String, HashSet<String>>,
    /// Tools where every permission-requiring call was approved for the
    /// session.  Kept separate from the key sets so approval keys are never
    /// widened to a wildcard.
    all_approved: HashSet<String>,
}

pub struct PermissionGate {
    state: std::sync::Mutex<GateState>,
    prompt: Arc<dyn ApprovalPrompt>,
    bash_rules: Vec<(Regex, &'static str)>,
    file_rules: Vec<(Regex, &'static str)>,
    path: PathBuf,
}

impl PermissionGate {
    pub const PERMS_PATH: &'static str = ".grok/permissions.json";

    pub fn new(prompt: Arc<dyn ApprovalPrompt>) -> Self {
        Self::with_path(prompt, PathBuf::from(Self::PERMS_PATH))
    }

    /// Construct with an explicit persistence path (tests point this at a
    /// temp directory).
    pub fn with_path(prompt: Arc<dyn ApprovalPrompt>, path: PathBuf) -> Self {
        let compile = |rules: &[(&'static str, &'static str)]| {
            rules
                .iter()
                .filter_map(|(pat, why)| {
                    Regex::new(&format!("(?i){pat}")).ok().map(|re| (re, *why))
                })
                .collect::<Vec<_>>()
        };
        let gate = Self {
            state: std::sync::Mutex::new(GateState {
                mode: ApprovalMode::Approve,
                session: HashMap::new(),
                persistent: HashMap::new(),
                all_approved: HashSet::new(),
            }),
            prompt,
            bash_rules: compile(DANGEROUS_BASH_PATTERNS),
            file_rules: compile(DANGEROUS_FILE_PATTERNS),
            path,
        };
        gate.load();
        gate
    }

    pub fn mode(&self) -> ApprovalMode {
        self.state.lock().unwrap().mode
    }

    pub fn set_mode(&self, mode: ApprovalMode) {
        self.state.lock().unwrap().mode = mode;
        self.save();
    }

    /// Cycle to the next mode and return it.
    pub fn cycle_mode(&self) -> ApprovalMode {
        let next = {
            let mut state = self.state.lock().unwrap();
            state.mode = state.mode.next();
            state.mode
        };
        self.save();
        next
    }

    fn dangerous_bash(&self, command: &str) -> Option<&'static str> {
        self.bash_rules.iter().find(|(re, _)| re.is_match(command)).map(|(_, why)| *why)
    }

    fn dangerous_file(&self, path: &str) -> Option<&'static str> {
        self.file_rules.iter().find(|(re, _)| re.is_match(path)).map(|(_, why)| *why)
    }

    /// Compute the coarse approval key for a call.
    fn approval_key(tool: &str, args: &Value) -> String {
        match tool {
            "bash" => {
                let cmd = args.get("command").and_then(|v| v.as_str()).unwrap_or("");
                cmd.split_whitespace().next().unwrap_or("bash").to_string()
            }
            "write_file" | "edit_file" => {
                let path = args.get("file_path").and_then(|v| v.as_str()).unwrap_or("");
                match path.rsplit_once('/') {
                    Some((dir, _)) => format!("{dir}/*"),
                    None => path.to_string(),
                }
            }
            _ => tool.to_string(),
        }
    }

    fn is_approved(state: &GateState, tool: &str, key: &str) -> bool {
        if state.all_approved.contains(tool) {
            return true;
        }
        state.session.get(tool).map(|s| s.contains(key)).unwrap_or(false)
            || state.persistent.get(tool).map(|s| s.contains(key)).unwrap_or(false)
    }

    /// Classify a call: `(allowed, danger_reason, key)`.
    pub fn check(&self, tool: &str, args: &Value) -> Decision {
        let key = Self::approval_key(tool, args);
        let state = self.state.lock().unwrap();

        let danger = match tool {
            "bash" => {
                self.dangerous_bash(args.get("command").and_then(|v| v.as_str()).unwrap_or(""))
            }
            "write_file" | "edit_file" => {
                self.dangerous_file(args.get("file_path").and_then(|v| v.as_str()).unwrap_or(""))
            }
            _ => None,
        };

        if let Some(reason) = danger {
            // Dangerous operations always need approval, in every mode.
            if Self::is_approved(&state, tool, &key) {
                return Decision { allowed: true, danger_reason: None, key };
            }
            return Decision { allowed: false, danger_reason: Some(reason.to_string()), key };
        }

        match state.mode {
            ApprovalMode::Auto => Decision { allowed: true, danger_reason: None, key },
            ApprovalMode::Approve => {
                if Self::is_approved(&state, tool, &key) {
                    Decision { allowed: true, danger_reason: None, key }
                } else if matches!(tool, "bash" | "write_file" | "edit_file") {
                    Decision { allowed: false, danger_reason: None, key }
                } else {
                    Decision { allowed: true, danger_reason: None, key }
                }
            }
            ApprovalMode::Manual => {
                if Self::is_approved(&state, tool, &key) {
                    Decision { allowed: true, danger_reason: None, key }
                } else {
                    Decision { allowed: false, danger_reason: None, key }
                }
            }
        }
    }

    /// Record an approval.  `persistent` also writes it to disk.
    pub fn approve(&self, tool: &str, key: &str, persistent: bool) {
        {
            let mut state = self.state.lock().unwrap();
            state.session.entry(tool.to_string()).or_default().insert(key.to_string());
            if persistent {
                state.persistent.entry(tool.to_string()).or_default().insert(key.to_string());
            }
        }
        if persistent {
            self.save();
        }
    }

    /// Approve every permission-requiring call for a tool, session-wide.
    pub fn approve_all_for_tool(&self, tool: &str) {
        self.state.lock().unwrap().all_approved.insert(tool.to_string());
    }

    /// Gate a call end to end: check, then ask the prompt when approval is
    /// required.  `Err` carries the observation string for the model.
    pub async fn request(&self, tool: &str, args: &Value) -> Result<(), String> {
        let decision = self.check(tool, args);
        if decision.allowed {
            return Ok(());
        }
        let summary = format_tool_for_approval(tool, args);
        let answer =
            self.prompt.ask(tool, &summary, decision.danger_reason.as_deref()).await;
        match answer {
            ApprovalAnswer::Yes => Ok(()),
            ApprovalAnswer::Always => {
                self.approve(tool, &decision.key, true);
                Ok(())
            }
            ApprovalAnswer::No => {
                let mut msg = format!("Permission required: {summary}");
                if let Some(reason) = &decision.danger_reason {
                    msg.push_str(&format!("\nReason: {reason}"));
                }
                msg.push_str("\n\nUse approve_operation to approve, or modify the command.");
                Err(msg)
            }
        }
    }

    fn load(&self) {
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return;
        };
        match serde_json::from_str::<PersistedPermissions>(&text) {
            Ok(data) => {
                let mut state = self.state.lock().unwrap();
                if let Some(mode) = data.mode {
                    state.mode = mode;
                }
                state.persistent = data
                    .approvals
                    .into_iter()
                    .map(|(tool, keys)| (tool, keys.into_iter().collect()))
                    .collect();
            }
            Err(e) => warn!(path = %self.path.display(), error = %e, "ignoring malformed permissions file"),
        }
    }

    fn save(&self) {
        let data = {
            let state = self.state.lock().unwrap();
            PersistedPermissions {
                mode: Some(state.mode),
                approvals: state
                    .persistent
                    .iter()
                    .map(|(tool, keys)| {
                        let mut sorted: Vec<String> = keys.iter().cloned().collect();
                        sorted.sort();
                        (tool.clone(), sorted)
                    })
                    .collect(),
            }
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(text) = serde_json::to_string_pretty(&data) {
            if let Err(e) = std::fs::write(&self.path, text) {
                warn!(path = %self.path.display(), error = %e, "failed to persist permissions");
            }
        }
    }
}

/// One-line rendering of a tool call for the approval prompt.
pub fn format_tool_for_approval(tool: &str, args: &Value) -> String {
    match tool {
        "bash" => {
            let mut cmd = args.get("command").and_then(|v| v.as_str()).unwrap_or("").to_string();
            if cmd.len() > 80 {
                cmd.truncate(77);
                cmd.push_str("...");
            }
            format!("bash: {cmd}")
        }
        "write_file" => {
            let path = args.get("file_path").and_then(|v| v.as_str()).unwrap_or("");
            let lines =
                args.get("content").and_then(|v| v.as_str()).map(|c| c.lines().count()).unwrap_or(0);
            format!("write: {path} ({lines} lines)")
        }
        "edit_file" => {
            let path = args.get("file_path").and_then(|v| v.as_str()).unwrap_or("");
            format!("edit: {path}")
        }
        _ => {
            let mut rendered = args.to_string();
            if rendered.len() > 60 {
                rendered.truncate(60);
            }
            format!("{tool}: {rendered}")
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

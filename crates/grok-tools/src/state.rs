// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Session-scoped shared state.
//!
//! Every store here corresponds to a session-global concept (files read,
//! tasks, plan mode, background commands).  They are bundled into a single
//! [`SessionStores`] aggregate that is cloned into each tool at wiring time,
//! so resets are method calls on one handle instead of scattered globals.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Resolve a user-supplied path: `~` expansion, cwd-relative absolutization,
/// then canonicalization.  Paths that do not exist yet are normalized
/// logically so that the same file always maps to the same key.
pub fn resolve_path(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path).into_owned();
    let p = PathBuf::from(expanded);
    let abs = if p.is_absolute() {
        p
    } else {
        std::env::current_dir().unwrap_or_default().join(p)
    };
    abs.canonicalize().unwrap_or_else(|_| normalize(&abs))
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ─── ReadSet ─────────────────────────────────────────────────────────────────

/// Files read in this session.  A successful read inserts; a successful
/// write or edit removes, so the file must be re-read before the next
/// modification.  This is the predicate behind the read-before-modify gate.
#[derive(Debug, Default)]
pub struct ReadSet {
    paths: HashSet<PathBuf>,
}

impl ReadSet {
    pub fn mark(&mut self, path: &str) {
        self.paths.insert(resolve_path(path));
    }

    pub fn unmark(&mut self, path: &str) {
        self.paths.remove(&resolve_path(path));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(&resolve_path(path))
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

// ─── Tasks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Deleted,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "deleted" => Some(TaskStatus::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub subject: String,
    pub description: String,
    pub active_form: String,
    pub status: TaskStatus,
    pub blocked_by: Vec<String>,
    pub blocks: Vec<String>,
}

/// Field updates applied by [`TaskStore::update`].  Absent fields are left
/// unchanged.
#[derive(Debug, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub active_form: Option<String>,
    pub add_blocked_by: Vec<String>,
    pub add_blocks: Vec<String>,
}

/// Session task storage.  Ids are monotonically increasing integers rendered
/// as strings and are never reused: deletion removes the task but the
/// counter does not roll back.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: HashMap<String, Task>,
    counter: u64,
}

impl TaskStore {
    pub fn create(&mut self, subject: &str, description: &str, active_form: &str) -> Task {
        self.counter += 1;
        let id = self.counter.to_string();
        let task = Task {
            id: id.clone(),
            subject: subject.to_string(),
            description: description.to_string(),
            active_form: if active_form.is_empty() {
                format!("Working on: {subject}")
            } else {
                active_form.to_string()
            },
            status: TaskStatus::Pending,
            blocked_by: Vec::new(),
            blocks: Vec::new(),
        };
        self.tasks.insert(id, task.clone());
        task
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Apply a patch.  A `deleted` status removes the task from the store
    /// (and from all listings) and returns the removed task.
    pub fn update(&mut self, id: &str, patch: TaskPatch) -> Option<Task> {
        if patch.status == Some(TaskStatus::Deleted) {
            return self.tasks.remove(id);
        }
        let task = self.tasks.get_mut(id)?;
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(subject) = patch.subject {
            task.subject = subject;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(active_form) = patch.active_form {
            task.active_form = active_form;
        }
        task.blocked_by.extend(patch.add_blocked_by);
        task.blocks.extend(patch.add_blocks);
        Some(task.clone())
    }

    /// All live tasks in id order.
    pub fn list_all(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.id.parse::<u64>().unwrap_or(0));
        tasks
    }

    /// Pending and in-progress tasks in id order.
    pub fn active(&self) -> Vec<Task> {
        self.list_all()
            .into_iter()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
            .collect()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.counter = 0;
    }
}

// ─── Plan mode ───────────────────────────────────────────────────────────────

/// Plan-mode state machine: Inactive → enter → Active → exit → Inactive.
/// While active, `set_plan` may run any number of times; each run overwrites
/// the plan file and creates tasks for checkbox subjects not already created
/// in this plan session.
#[derive(Debug, Default)]
pub struct PlanState {
    pub active: bool,
    pub plan_file: PathBuf,
    pub plan_content: String,
    pub created_tasks: Vec<String>,
    /// Root under which `.grok/plans/` is created.  `None` means the current
    /// working directory at `enter` time; tests point this at a temp dir.
    pub base_dir: Option<PathBuf>,
}

impl PlanState {
    /// Enter plan mode, allocating a plan file under `.grok/plans/`.
    pub fn enter(&mut self) -> std::io::Result<()> {
        let base = match &self.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let dir = base.join(".grok").join("plans");
        std::fs::create_dir_all(&dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.plan_file = dir.join(format!("plan_{stamp}.md"));
        self.plan_content.clear();
        self.created_tasks.clear();
        self.active = true;
        Ok(())
    }

    pub fn exit(&mut self) {
        self.active = false;
        self.created_tasks.clear();
    }

    /// Store plan content, write the plan file, and create a task for every
    /// `- [ ]` subject not seen before in this plan session.  Returns the
    /// number of tasks created.
    pub fn set_plan(&mut self, content: &str, tasks: &mut TaskStore) -> std::io::Result<usize> {
        self.plan_content = content.to_string();
        if let Some(parent) = self.plan_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.plan_file, content)?;

        let mut created = 0;
        for subject in extract_checkbox_subjects(content) {
            if !self.created_tasks.contains(&subject) {
                let truncated: String = subject.chars().take(40).collect();
                tasks.create(
                    &subject,
                    &format!("Plan task: {subject}"),
                    &format!("Working on: {truncated}..."),
                );
                self.created_tasks.push(subject);
                created += 1;
            }
        }
        Ok(created)
    }

    pub fn reset(&mut self) {
        *self = PlanState::default();
    }
}

/// Extract `- [ ] <subject>` lines, trimmed, in order of appearance.
pub fn extract_checkbox_subjects(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("- [ ] "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ─── Background bash ─────────────────────────────────────────────────────────

/// A command launched with `run_in_background`.  Jobs are terminal once
/// `completed` flips; entries are never removed — the registry is unbounded
/// and scoped to a developer session.
#[derive(Debug, Default)]
pub struct BackgroundJob {
    pub id: String,
    pub command: String,
    pub output: String,
    pub completed: bool,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Default)]
pub struct BackgroundTasks {
    jobs: HashMap<String, Arc<Mutex<BackgroundJob>>>,
}

impl BackgroundTasks {
    /// Allocate a fresh `bg-<8 hex>` job id.
    pub fn new_id() -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        format!("bg-{}", &hex[..8])
    }

    pub fn add(&mut self, id: &str, command: &str) -> Arc<Mutex<BackgroundJob>> {
        let job = Arc::new(Mutex::new(BackgroundJob {
            id: id.to_string(),
            command: command.to_string(),
            ..BackgroundJob::default()
        }));
        self.jobs.insert(id.to_string(), job.clone());
        job
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<BackgroundJob>>> {
        self.jobs.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// All session stores behind one cloneable handle.  Tools receive clones at
/// wiring time; the REPL's `clear` path resets through this handle.
#[derive(Clone, Default)]
pub struct SessionStores {
    pub read_files: Arc<Mutex<ReadSet>>,
    pub tasks: Arc<Mutex<TaskStore>>,
    pub plan: Arc<Mutex<PlanState>>,
    pub background: Arc<Mutex<BackgroundTasks>>,
}

impl SessionStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reset(&self) {
        self.read_files.lock().await.clear();
        self.tasks.lock().await.clear();
        self.plan.lock().await.reset();
        self.background.lock().await.clear();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

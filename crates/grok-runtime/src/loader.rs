// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Plugin loading.
//!
//! A full plugin is a directory carrying `.grok-plugin/plugin.json` plus
//! optional `agents/`, `commands/`, `skills/`, and `hooks/` subdirectories.
//! Standalone agent files (`.grok/agents/*.md`) are collected into a
//! synthetic `local` plugin so consumers see one uniform shape.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::frontmatter::parse_frontmatter;

/// Agent definition parsed from a markdown file.  Consumed by the sub-agent
/// runtime as an immutable record.
#[derive(Debug, Clone)]
pub struct AgentDef {
    pub name: String,
    pub description: String,
    /// System prompt body (everything after the frontmatter).
    pub prompt: String,
    /// Allowed tool names; empty means unrestricted.
    pub tools: Vec<String>,
    pub model: String,
    pub color: String,
    pub plugin: String,
    pub file_path: PathBuf,
}

impl AgentDef {
    /// Name including the plugin prefix, e.g. `review-kit:security`.
    pub fn full_name(&self) -> String {
        if self.plugin.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.plugin, self.name)
        }
    }
}

/// Slash-command definition.
#[derive(Debug, Clone)]
pub struct CommandDef {
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub argument_hint: String,
    pub plugin: String,
    pub file_path: PathBuf,
}

impl CommandDef {
    pub fn full_name(&self) -> String {
        if self.plugin.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.plugin, self.name)
        }
    }
}

/// Skill definition (trigger-invoked commands).
#[derive(Debug, Clone)]
pub struct SkillDef {
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub triggers: Vec<String>,
    pub plugin: String,
    pub file_path: PathBuf,
}

/// Hook definition; the event is derived from the script's filename.
#[derive(Debug, Clone)]
pub struct HookDef {
    pub name: String,
    pub event: String,
    pub script: PathBuf,
    pub plugin: String,
}

#[derive(Debug, Clone)]
pub struct Plugin {
    pub name: String,
    pub version: String,
    pub description: String,
    pub path: PathBuf,
    pub agents: Vec<AgentDef>,
    pub commands: Vec<CommandDef>,
    pub skills: Vec<SkillDef>,
    pub hooks: Vec<HookDef>,
}

#[derive(Debug, Deserialize)]
struct PluginManifest {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
}

/// Discovers and loads plugins from a set of search directories.
#[derive(Debug, Default)]
pub struct PluginLoader {
    plugin_dirs: Vec<PathBuf>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plugin_dir(&mut self, path: PathBuf) {
        if !self.plugin_dirs.contains(&path) {
            self.plugin_dirs.push(path);
        }
    }

    /// Directories carrying a `.grok-plugin/plugin.json` marker.
    pub fn discover_plugins(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for base in &self.plugin_dirs {
            let Ok(entries) = std::fs::read_dir(base) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() && path.join(".grok-plugin").join("plugin.json").is_file() {
                    found.push(path);
                }
            }
        }
        found.sort();
        found
    }

    /// Load one plugin directory; `None` when the manifest is absent or
    /// unparseable.
    pub fn load_plugin(&self, plugin_path: &Path) -> Option<Plugin> {
        let manifest_path = plugin_path.join(".grok-plugin").join("plugin.json");
        let manifest: PluginManifest = match std::fs::read_to_string(&manifest_path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %manifest_path.display(), error = %e, "skipping plugin with malformed manifest");
                    return None;
                }
            },
            Err(_) => return None,
        };

        let fallback_name =
            plugin_path.file_name().and_then(|n| n.to_str()).unwrap_or("plugin").to_string();
        let name = manifest.name.unwrap_or(fallback_name);

        let mut plugin = Plugin {
            name: name.clone(),
            version: manifest.version.unwrap_or_else(|| "1.0.0".to_string()),
            description: manifest.description.unwrap_or_default(),
            path: plugin_path.to_path_buf(),
            agents: Vec::new(),
            commands: Vec::new(),
            skills: Vec::new(),
            hooks: Vec::new(),
        };

        for file in md_files(&plugin_path.join("agents")) {
            if let Some(agent) = load_agent(&file, &name) {
                plugin.agents.push(agent);
            }
        }
        for file in md_files(&plugin_path.join("commands")) {
            if let Some(cmd) = load_command(&file, &name) {
                plugin.commands.push(cmd);
            }
        }
        for file in md_files(&plugin_path.join("skills")) {
            if let Some(skill) = load_skill(&file, &name) {
                plugin.skills.push(skill);
            }
        }
        for file in script_files(&plugin_path.join("hooks")) {
            plugin.hooks.push(load_hook(&file, &name));
        }

        Some(plugin)
    }

    /// Load all discovered plugins plus standalone agent files found directly
    /// in the search directories (grouped under a synthetic `local` plugin).
    pub fn load_all(&self) -> Vec<Plugin> {
        let mut plugins: Vec<Plugin> =
            self.discover_plugins().iter().filter_map(|p| self.load_plugin(p)).collect();

        let mut standalone: Vec<AgentDef> = Vec::new();
        for base in &self.plugin_dirs {
            for file in md_files(base) {
                if let Some(agent) = load_agent(&file, "local") {
                    standalone.push(agent);
                }
            }
        }

        if !standalone.is_empty() {
            plugins.push(Plugin {
                name: "local".to_string(),
                version: "1.0.0".to_string(),
                description: "Local project agents".to_string(),
                path: PathBuf::new(),
                agents: standalone,
                commands: Vec::new(),
                skills: Vec::new(),
                hooks: Vec::new(),
            });
        }

        plugins
    }
}

fn md_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("md"))
        .collect();
    files.sort();
    files
}

fn script_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> =
        entries.flatten().map(|e| e.path()).filter(|p| p.is_file()).collect();
    files.sort();
    files
}

fn stem(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed").to_string()
}

fn load_agent(path: &Path, plugin: &str) -> Option<AgentDef> {
    let content = std::fs::read_to_string(path).ok()?;
    let (fm, body) = parse_frontmatter(&content);
    Some(AgentDef {
        name: fm.name.unwrap_or_else(|| stem(path)),
        description: fm.description.unwrap_or_default(),
        prompt: body.trim().to_string(),
        tools: fm.tools,
        model: fm.model.unwrap_or_else(|| "default".to_string()),
        color: fm.color.unwrap_or_else(|| "cyan".to_string()),
        plugin: plugin.to_string(),
        file_path: path.to_path_buf(),
    })
}

fn load_command(path: &Path, plugin: &str) -> Option<CommandDef> {
    let content = std::fs::read_to_string(path).ok()?;
    let (fm, body) = parse_frontmatter(&content);
    Some(CommandDef {
        name: stem(path),
        description: fm.description.unwrap_or_default(),
        prompt: body.trim().to_string(),
        argument_hint: fm.argument_hint.unwrap_or_default(),
        plugin: plugin.to_string(),
        file_path: path.to_path_buf(),
    })
}

fn load_skill(path: &Path, plugin: &str) -> Option<SkillDef> {
    let content = std::fs::read_to_string(path).ok()?;
    let (fm, body) = parse_frontmatter(&content);
    Some(SkillDef {
        name: stem(path),
        description: fm.description.unwrap_or_default(),
        prompt: body.trim().to_string(),
        triggers: fm.triggers,
        plugin: plugin.to_string(),
        file_path: path.to_path_buf(),
    })
}

fn load_hook(path: &Path, plugin: &str) -> HookDef {
    let name = stem(path);
    let event = match name.to_lowercase().as_str() {
        "pretooluse" => "PreToolUse",
        "posttooluse" => "PostToolUse",
        "sessionstart" => "SessionStart",
        "stop" => "Stop",
        "userpromptsubmit" => "UserPromptSubmit",
        other => return HookDef {
            name: name.clone(),
            event: other.to_string(),
            script: path.to_path_buf(),
            plugin: plugin.to_string(),
        },
    };
    HookDef {
        name,
        event: event.to_string(),
        script: path.to_path_buf(),
        plugin: plugin.to_string(),
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write_plugin(base: &Path, name: &str) -> PathBuf {
        let root = base.join(name);
        std::fs::create_dir_all(root.join(".grok-plugin")).unwrap();
        std::fs::write(
            root.join(".grok-plugin/plugin.json"),
            format!(r#"{{"name": "{name}", "version": "2.1.0", "description": "test plugin"}}"#),
        )
        .unwrap();
        root
    }

    #[test]
    fn discovers_only_marked_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(dir.path(), "real");
        std::fs::create_dir_all(dir.path().join("not-a-plugin")).unwrap();

        let mut loader = PluginLoader::new();
        loader.add_plugin_dir(dir.path().to_path_buf());
        let found = loader.discover_plugins();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("real"));
    }

    #[test]
    fn loads_manifest_fields() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_plugin(dir.path(), "kit");
        let loader = PluginLoader::new();
        let plugin = loader.load_plugin(&root).unwrap();
        assert_eq!(plugin.name, "kit");
        assert_eq!(plugin.version, "2.1.0");
        assert_eq!(plugin.description, "test plugin");
    }

    #[test]
    fn loads_agents_commands_skills_and_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_plugin(dir.path(), "kit");
        std::fs::create_dir_all(root.join("agents")).unwrap();
        std::fs::write(
            root.join("agents/auditor.md"),
            "---\nname: auditor\ndescription: Audits code\ntools: read_file, grep\n---\nYou audit.",
        )
        .unwrap();
        std::fs::create_dir_all(root.join("commands")).unwrap();
        std::fs::write(
            root.join("commands/deploy.md"),
            "---\ndescription: Deploys\nargument-hint: <env>\n---\nDeploy now.",
        )
        .unwrap();
        std::fs::create_dir_all(root.join("skills")).unwrap();
        std::fs::write(
            root.join("skills/review.md"),
            "---\ndescription: Review skill\ntriggers: review, lgtm\n---\nReview things.",
        )
        .unwrap();
        std::fs::create_dir_all(root.join("hooks")).unwrap();
        std::fs::write(root.join("hooks/pretooluse.py"), "# hook").unwrap();

        let plugin = PluginLoader::new().load_plugin(&root).unwrap();
        assert_eq!(plugin.agents.len(), 1);
        assert_eq!(plugin.agents[0].name, "auditor");
        assert_eq!(plugin.agents[0].tools, vec!["read_file", "grep"]);
        assert_eq!(plugin.agents[0].prompt, "You audit.");
        assert_eq!(plugin.agents[0].full_name(), "kit:auditor");

        assert_eq!(plugin.commands.len(), 1);
        assert_eq!(plugin.commands[0].name, "deploy");
        assert_eq!(plugin.commands[0].argument_hint, "<env>");

        assert_eq!(plugin.skills.len(), 1);
        assert_eq!(plugin.skills[0].triggers, vec!["review", "lgtm"]);

        assert_eq!(plugin.hooks.len(), 1);
        assert_eq!(plugin.hooks[0].event, "PreToolUse");
    }

    #[test]
    fn standalone_agents_become_local_plugin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("engineer.md"),
            "---\ndescription: Engineer agent\n---\nYou engineer.",
        )
        .unwrap();

        let mut loader = PluginLoader::new();
        loader.add_plugin_dir(dir.path().to_path_buf());
        let plugins = loader.load_all();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name, "local");
        assert_eq!(plugins[0].agents[0].name, "engineer");
    }

    #[test]
    fn agent_name_defaults_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("helper.md"), "No frontmatter at all.").unwrap();
        let agent = load_agent(&dir.path().join("helper.md"), "local").unwrap();
        assert_eq!(agent.name, "helper");
        assert_eq!(agent.prompt, "No frontmatter at all.");
        assert!(agent.tools.is_empty());
    }

    #[test]
    fn malformed_manifest_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("broken");
        std::fs::create_dir_all(root.join(".grok-plugin")).unwrap();
        std::fs::write(root.join(".grok-plugin/plugin.json"), "{not json").unwrap();
        assert!(PluginLoader::new().load_plugin(&root).is_none());
    }
}

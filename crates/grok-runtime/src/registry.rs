// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::loader::{AgentDef, CommandDef, HookDef, Plugin, PluginLoader, SkillDef};

#[derive(Default)]
struct Catalog {
    plugins: HashMap<String, Plugin>,
    agents: HashMap<String, AgentDef>,
    commands: HashMap<String, CommandDef>,
    skills: HashMap<String, SkillDef>,
    hooks: HashMap<String, Vec<HookDef>>,
}

/// Central read-mostly access to all plugins and their components.
///
/// Components are addressable both by bare name and by `plugin:name`; the
/// bare form keeps the first registration so plugin order is stable.  The
/// interior lock allows `reload` without exclusive ownership — consumers
/// hold an `Arc<PluginRegistry>` and always see a consistent snapshot.
pub struct PluginRegistry {
    loader: RwLock<PluginLoader>,
    catalog: RwLock<Catalog>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self { loader: RwLock::new(PluginLoader::new()), catalog: RwLock::new(Catalog::default()) }
    }

    /// Registry preloaded with the standard search directories for `cwd`:
    /// `~/.grokcode/plugins`, `<cwd>/.grok/plugins`, `<cwd>/.grok/agents`.
    pub fn with_default_dirs(cwd: &std::path::Path) -> Self {
        let registry = Self::new();
        if let Some(home) = dirs::home_dir() {
            registry.add_plugin_dir(home.join(".grokcode").join("plugins"));
        }
        registry.add_plugin_dir(cwd.join(".grok").join("plugins"));
        registry.add_plugin_dir(cwd.join(".grok").join("agents"));
        registry.load_plugins();
        registry
    }

    pub fn add_plugin_dir(&self, path: PathBuf) {
        self.loader.write().unwrap().add_plugin_dir(path);
    }

    pub fn load_plugins(&self) {
        let plugins = self.loader.read().unwrap().load_all();
        let mut catalog = self.catalog.write().unwrap();
        for plugin in plugins {
            register_plugin(&mut catalog, plugin);
        }
    }

    /// Drop everything and re-scan the search directories.
    pub fn reload(&self) {
        *self.catalog.write().unwrap() = Catalog::default();
        self.load_plugins();
    }

    pub fn get_plugin(&self, name: &str) -> Option<Plugin> {
        self.catalog.read().unwrap().plugins.get(name).cloned()
    }

    /// Look up an agent by bare name or `plugin:name`.
    pub fn get_agent(&self, name: &str) -> Option<AgentDef> {
        self.catalog.read().unwrap().agents.get(name).cloned()
    }

    pub fn get_command(&self, name: &str) -> Option<CommandDef> {
        self.catalog.read().unwrap().commands.get(name).cloned()
    }

    pub fn get_skill(&self, name: &str) -> Option<SkillDef> {
        self.catalog.read().unwrap().skills.get(name).cloned()
    }

    pub fn get_hooks(&self, event: &str) -> Vec<HookDef> {
        self.catalog.read().unwrap().hooks.get(event).cloned().unwrap_or_default()
    }

    /// All agents, deduplicated by full name and sorted for display.
    pub fn list_agents(&self) -> Vec<AgentDef> {
        let catalog = self.catalog.read().unwrap();
        let mut seen = std::collections::HashSet::new();
        let mut agents: Vec<AgentDef> = catalog
            .agents
            .values()
            .filter(|a| seen.insert(a.full_name()))
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.full_name().cmp(&b.full_name()));
        agents
    }

    pub fn list_commands(&self) -> Vec<CommandDef> {
        let catalog = self.catalog.read().unwrap();
        let mut seen = std::collections::HashSet::new();
        let mut commands: Vec<CommandDef> = catalog
            .commands
            .values()
            .filter(|c| seen.insert(c.full_name()))
            .cloned()
            .collect();
        commands.sort_by(|a, b| a.full_name().cmp(&b.full_name()));
        commands
    }

    pub fn list_plugins(&self) -> Vec<Plugin> {
        let catalog = self.catalog.read().unwrap();
        let mut plugins: Vec<Plugin> = catalog.plugins.values().cloned().collect();
        plugins.sort_by(|a, b| a.name.cmp(&b.name));
        plugins
    }
}

fn register_plugin(catalog: &mut Catalog, plugin: Plugin) {
    for agent in &plugin.agents {
        catalog.agents.insert(agent.full_name(), agent.clone());
        catalog.agents.entry(agent.name.clone()).or_insert_with(|| agent.clone());
    }
    for cmd in &plugin.commands {
        catalog.commands.insert(cmd.full_name(), cmd.clone());
        catalog.commands.entry(cmd.name.clone()).or_insert_with(|| cmd.clone());
    }
    for skill in &plugin.skills {
        catalog.skills.insert(format!("{}:{}", plugin.name, skill.name), skill.clone());
        catalog.skills.entry(skill.name.clone()).or_insert_with(|| skill.clone());
    }
    for hook in &plugin.hooks {
        catalog.hooks.entry(hook.event.clone()).or_default().push(hook.clone());
    }
    catalog.plugins.insert(plugin.name.clone(), plugin);
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_registry(dir: &std::path::Path) -> PluginRegistry {
        let root = dir.join("toolkit");
        std::fs::create_dir_all(root.join(".grok-plugin")).unwrap();
        std::fs::write(
            root.join(".grok-plugin/plugin.json"),
            r#"{"name": "toolkit", "version": "1.0.0", "description": "kit"}"#,
        )
        .unwrap();
        std::fs::create_dir_all(root.join("agents")).unwrap();
        std::fs::write(
            root.join("agents/auditor.md"),
            "---\nname: auditor\ndescription: Audits\n---\nAudit prompt.",
        )
        .unwrap();

        let registry = PluginRegistry::new();
        registry.add_plugin_dir(dir.to_path_buf());
        registry.load_plugins();
        registry
    }

    #[test]
    fn agent_lookup_by_bare_and_prefixed_name() {
        let dir = tempfile::tempdir().unwrap();
        let registry = seeded_registry(dir.path());
        assert!(registry.get_agent("auditor").is_some());
        assert!(registry.get_agent("toolkit:auditor").is_some());
        assert!(registry.get_agent("missing").is_none());
    }

    #[test]
    fn list_agents_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let registry = seeded_registry(dir.path());
        let agents = registry.list_agents();
        assert_eq!(agents.len(), 1, "bare + prefixed entries must collapse");
        assert_eq!(agents[0].name, "auditor");
    }

    #[test]
    fn reload_picks_up_new_agents() {
        let dir = tempfile::tempdir().unwrap();
        let registry = seeded_registry(dir.path());
        assert!(registry.get_agent("newcomer").is_none());

        std::fs::write(
            dir.path().join("toolkit/agents/newcomer.md"),
            "---\ndescription: Late arrival\n---\nPrompt.",
        )
        .unwrap();
        registry.reload();
        assert!(registry.get_agent("newcomer").is_some());
    }

    #[test]
    fn empty_registry_lists_nothing() {
        let registry = PluginRegistry::new();
        assert!(registry.list_agents().is_empty());
        assert!(registry.list_plugins().is_empty());
    }
}

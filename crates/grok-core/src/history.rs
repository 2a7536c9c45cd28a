// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Transcript persistence.
//!
//! Transcripts are markdown files under `.grok/history/`, named
//! `conversation_<YYYYMMDD_HHMMSS>.md`.  Only user and assistant text turns
//! are saved; the system head and tool observations are rebuilt on load.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use grok_model::{Message, Role};

pub fn history_dir(base: &Path) -> PathBuf {
    base.join(".grok").join("history")
}

/// Render user/assistant turns as markdown sections.
pub fn serialize_transcript(messages: &[Message]) -> String {
    let mut out = String::from("# Conversation\n");
    for message in messages {
        let Some(content) = message.content.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        match message.role {
            Role::User => {
                out.push_str("\n## User\n");
                out.push_str(content);
                out.push('\n');
            }
            Role::Assistant => {
                out.push_str("\n## Assistant\n");
                out.push_str(content);
                out.push('\n');
            }
            _ => {}
        }
    }
    out
}

/// Parse a transcript back into user/assistant messages.
pub fn parse_transcript(content: &str) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut role: Option<Role> = None;
    let mut buffer: Vec<&str> = Vec::new();

    let mut flush = |role: Option<Role>, buffer: &mut Vec<&str>, messages: &mut Vec<Message>| {
        if let Some(role) = role {
            let text = buffer.join("\n").trim().to_string();
            if !text.is_empty() {
                match role {
                    Role::User => messages.push(Message::user(text)),
                    Role::Assistant => messages.push(Message::assistant(text)),
                    _ => {}
                }
            }
        }
        buffer.clear();
    };

    for line in content.lines() {
        match line.trim() {
            "## User" => {
                flush(role, &mut buffer, &mut messages);
                role = Some(Role::User);
            }
            "## Assistant" => {
                flush(role, &mut buffer, &mut messages);
                role = Some(Role::Assistant);
            }
            _ => buffer.push(line),
        }
    }
    flush(role, &mut buffer, &mut messages);
    messages
}

/// Save a transcript; returns the file path.
pub fn save(base: &Path, messages: &[Message]) -> Result<PathBuf> {
    let dir = history_dir(base);
    fs::create_dir_all(&dir)
        .with_context(|| format!("creating history directory {}", dir.display()))?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("conversation_{stamp}.md"));
    fs::write(&path, serialize_transcript(messages))
        .with_context(|| format!("writing transcript to {}", path.display()))?;
    Ok(path)
}

/// List saved transcript ids (file stems), most recent first.
pub fn list(base: &Path) -> Vec<String> {
    let dir = history_dir(base);
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut ids: Vec<String> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    ids.sort_by(|a, b| b.cmp(a));
    ids
}

/// Resolve an id (exact stem or unique prefix) and load its turns.
pub fn load(base: &Path, id: &str) -> Result<Vec<Message>> {
    let dir = history_dir(base);
    let exact = dir.join(format!("{id}.md"));
    let path = if exact.is_file() {
        exact
    } else {
        let matches: Vec<String> =
            list(base).into_iter().filter(|stem| stem.starts_with(id)).collect();
        match matches.len() {
            1 => dir.join(format!("{}.md", matches[0])),
            0 => anyhow::bail!("no saved conversation matches '{id}'"),
            n => anyhow::bail!("ambiguous id '{id}' matches {n} conversations"),
        }
    };
    let content = fs::read_to_string(&path)
        .with_context(|| format!("reading transcript {}", path.display()))?;
    Ok(parse_transcript(&content))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! YAML-style frontmatter for agent/command/skill markdown files.
//!
//! Frontmatter is a `---`-delimited `key: value` block at the head of the
//! file.  Recognized keys: `name`, `description`, `tools` (comma list),
//! `model`, `color`, `triggers` (comma list), `argument-hint`.  Everything
//! after the closing delimiter is the prompt body.

/// The keys the loader recognizes, in canonical emit order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tools: Vec<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub triggers: Vec<String>,
    pub argument_hint: Option<String>,
}

/// Parse optional frontmatter.  Returns `(frontmatter, body)`; when no
/// well-formed block is found the frontmatter is empty and the body is the
/// whole input.
pub fn parse_frontmatter(content: &str) -> (Frontmatter, &str) {
    let Some(header) = content.strip_prefix("---") else {
        return (Frontmatter::default(), content);
    };
    // The opening delimiter must be its own line.
    let Some(header) = header.strip_prefix('\n').or_else(|| header.strip_prefix("\r\n")) else {
        return (Frontmatter::default(), content);
    };
    let Some(close) = header.find("\n---") else {
        return (Frontmatter::default(), content);
    };

    let block = &header[..close];
    let after = &header[close + 4..];
    let body = after.strip_prefix('\n').or_else(|| after.strip_prefix("\r\n")).unwrap_or(after);

    let mut fm = Frontmatter::default();
    for line in block.lines() {
        let Some((key, raw_value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = unquote(raw_value.trim()).to_string();
        if value.is_empty() {
            continue;
        }
        match key {
            "name" => fm.name = Some(value),
            "description" => fm.description = Some(value),
            "tools" => fm.tools = split_list(&value),
            "model" => fm.model = Some(value),
            "color" => fm.color = Some(value),
            "triggers" => fm.triggers = split_list(&value),
            "argument-hint" => fm.argument_hint = Some(value),
            // Unknown keys are ignored for forward compatibility.
            _ => {}
        }
    }

    (fm, body.trim_start_matches('\n'))
}

/// Re-emit the recognized keys as a `---`-delimited block.  Parsing the
/// output yields a [`Frontmatter`] equal to the input.
pub fn emit_frontmatter(fm: &Frontmatter) -> String {
    let mut out = String::from("---\n");
    let mut push = |key: &str, value: &str| {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    };
    if let Some(name) = &fm.name {
        push("name", name);
    }
    if let Some(description) = &fm.description {
        push("description", description);
    }
    if !fm.tools.is_empty() {
        push("tools", &fm.tools.join(", "));
    }
    if let Some(model) = &fm.model {
        push("model", model);
    }
    if let Some(color) = &fm.color {
        push("color", color);
    }
    if !fm.triggers.is_empty() {
        push("triggers", &fm.triggers.join(", "));
    }
    if let Some(hint) = &fm.argument_hint {
        push("argument-hint", hint);
    }
    out.push_str("---\n");
    out
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect()
}

/// Strip one layer of matching `"..."` or `'...'` quotes if present.
fn unquote(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

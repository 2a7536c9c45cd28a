// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Recursive HTML-unescaping of tool arguments.
//!
//! The remote endpoint double-encodes certain characters inside tool-call
//! argument strings (`&amp;`, `&lt;`, `&quot;`, numeric references).  Every
//! string field of the parsed arguments map must be unescaped before
//! dispatch — this is contract behavior, not a cosmetic fix.

use serde_json::Value;

/// Unescape HTML entities in every string contained in `value`, recursing
/// through objects and arrays.  Non-string leaves pass through unchanged.
pub fn unescape_html_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(unescape_html_str(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(unescape_html_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter().map(|(k, v)| (k, unescape_html_value(v))).collect(),
        ),
        other => other,
    }
}

/// Decode the entity forms the endpoint actually emits: the named set
/// (`amp`, `lt`, `gt`, `quot`, `#39`/`apos`, `nbsp`) plus decimal and hex
/// numeric character references.
fn unescape_html_str(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        // Entities are short; a distant ';' means this '&' is literal.
        let Some(semi) = rest.find(';').filter(|i| *i <= 12) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = decode_entity(entity);
        match decoded {
            Some(ch) => {
                out.push_str(&ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<String> {
    match entity {
        "amp" => return Some("&".into()),
        "lt" => return Some("<".into()),
        "gt" => return Some(">".into()),
        "quot" => return Some("\"".into()),
        "apos" => return Some("'".into()),
        "nbsp" => return Some(" ".into()),
        _ => {}
    }
    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()?
    } else {
        return None;
    };
    char::from_u32(code).map(|c| c.to_string())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

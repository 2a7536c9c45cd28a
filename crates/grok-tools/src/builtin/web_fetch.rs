// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{require_str, Tool};

const MAX_CHARS: usize = 50_000;

pub struct WebFetchTool {
    timeout_secs: u64,
}

impl WebFetchTool {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch content from a URL and extract information. Use this to:\n\
         - Read documentation pages\n\
         - Fetch API responses\n\
         - Get content from public web pages\n\n\
         Note: Won't work for authenticated pages (login required)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                },
                "prompt": {
                    "type": "string",
                    "description": "What information to extract from the page"
                }
            },
            "required": ["url", "prompt"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let url = match require_str(args, "url") {
            Ok(u) => u.to_string(),
            Err(e) => return e,
        };
        let prompt = match require_str(args, "prompt") {
            Ok(p) => p,
            Err(e) => return e,
        };

        // Default to https and reject anything that is not http(s).
        let url = if url.contains("://") { url } else { format!("https://{url}") };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            let scheme = url.split("://").next().unwrap_or("");
            return format!("Error: Invalid URL scheme: {scheme}");
        }

        debug!(url = %url, "web_fetch tool");

        match fetch(&url, self.timeout_secs).await {
            Ok(text) => format!("Content from {url}:\n\n{text}\n\n---\nUser prompt: {prompt}"),
            Err(e) => format!("Error fetching URL: {e}"),
        }
    }
}

async fn fetch(url: &str, timeout_secs: u64) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .user_agent("grok-code/1.0")
        .build()?;

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP {} - {}", status.as_u16(), status.canonical_reason().unwrap_or(""));
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();
    let body = response.text().await?;

    let mut text = if content_type.contains("text/html") { html_to_text(&body) } else { body };

    if text.len() > MAX_CHARS {
        let mut cut = MAX_CHARS;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n\n... (truncated)");
    }
    Ok(text)
}

/// HTML → readable text: strip script/style, turn structural tags into
/// newlines and list markers, drop remaining tags, decode common entities,
/// collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let script = Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
    let style = Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
    let br = Regex::new(r"(?i)<br\s*/?>").unwrap();
    let para = Regex::new(r"(?i)</?p[^>]*>").unwrap();
    let div = Regex::new(r"(?i)</?div[^>]*>").unwrap();
    let li = Regex::new(r"(?i)<li[^>]*>").unwrap();
    let h_open = Regex::new(r"(?i)<h[1-6][^>]*>").unwrap();
    let h_close = Regex::new(r"(?i)</h[1-6]>").unwrap();
    let any_tag = Regex::new(r"<[^>]+>").unwrap();
    let excess_newlines = Regex::new(r"\n{3,}").unwrap();

    let text = script.replace_all(html, "");
    let text = style.replace_all(&text, "");
    let text = br.replace_all(&text, "\n");
    let text = para.replace_all(&text, "\n\n");
    let text = div.replace_all(&text, "\n");
    let text = li.replace_all(&text, "\n- ");
    let text = h_open.replace_all(&text, "\n\n## ");
    let text = h_close.replace_all(&text, "\n");
    let text = any_tag.replace_all(&text, "");

    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    let lines: Vec<&str> =
        text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let joined = lines.join("\n");
    excess_newlines.replace_all(&joined, "\n\n").trim().to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scripts_and_styles_are_stripped() {
        let html = "<html><script>evil()</script><style>.x{}</style><p>visible</p></html>";
        let text = html_to_text(html);
        assert_eq!(text, "visible");
    }

    #[test]
    fn headings_become_markdown_sections() {
        let html = "<h1>Title</h1><p>Body text</p>";
        let text = html_to_text(html);
        assert!(text.contains("## Title"), "got: {text}");
        assert!(text.contains("Body text"));
    }

    #[test]
    fn list_items_get_markers() {
        let html = "<ul><li>first</li><li>second</li></ul>";
        let text = html_to_text(html);
        assert!(text.contains("- first"));
        assert!(text.contains("- second"));
    }

    #[test]
    fn entities_are_decoded() {
        let text = html_to_text("<p>a &amp; b &lt;c&gt; &quot;d&quot; it&#39;s&nbsp;here</p>");
        assert_eq!(text, "a & b <c> \"d\" it's here");
    }

    #[test]
    fn blank_lines_are_collapsed() {
        let html = "<p>one</p><p></p><p></p><p>two</p>";
        let text = html_to_text(html);
        assert!(!text.contains("\n\n\n"), "got: {text:?}");
    }

    #[tokio::test]
    async fn invalid_scheme_is_rejected() {
        let tool = WebFetchTool::new(30);
        let out = tool.execute(&json!({"url": "ftp://host/file", "prompt": "x"})).await;
        assert_eq!(out, "Error: Invalid URL scheme: ftp");
    }

    #[tokio::test]
    async fn missing_prompt_is_error() {
        let tool = WebFetchTool::new(30);
        let out = tool.execute(&json!({"url": "https://example.com"})).await;
        assert!(out.starts_with("Error:"));
        assert!(out.contains("'prompt'"));
    }

    #[tokio::test]
    async fn unreachable_host_reports_fetch_error() {
        let tool = WebFetchTool::new(2);
        let out = tool
            .execute(&json!({"url": "http://127.0.0.1:1/nothing", "prompt": "x"}))
            .await;
        assert!(out.starts_with("Error fetching URL:"), "got: {out}");
    }

    #[tokio::test]
    async fn served_html_is_converted_and_wrapped() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let body = "<html><body><h1>Docs</h1><p>Hello page</p></body></html>";
            let resp = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
        });

        let tool = WebFetchTool::new(5);
        let out = tool
            .execute(&json!({
                "url": format!("http://127.0.0.1:{port}/"),
                "prompt": "summarize"
            }))
            .await;
        assert!(out.starts_with("Content from http://"), "got: {out}");
        assert!(out.contains("## Docs"));
        assert!(out.contains("Hello page"));
        assert!(out.ends_with("User prompt: summarize"));
    }
}

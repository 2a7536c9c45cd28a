// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{opt_u64, require_str, Tool};

const MAX_RESULTS: usize = 10;

/// Keyless web search against the DuckDuckGo HTML endpoint.
pub struct WebSearchTool {
    timeout_secs: u64,
}

impl WebSearchTool {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns search results with titles, URLs, and \
         snippets. Use for finding documentation, solutions, or current information."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default 5, max 10)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value) -> String {
        let query = match require_str(args, "query") {
            Ok(q) => q.to_string(),
            Err(e) => return e,
        };
        let max_results = opt_u64(args, "max_results").unwrap_or(5).min(MAX_RESULTS as u64) as usize;

        debug!(query = %query, max_results, "web_search tool");

        let html = match search(&query, self.timeout_secs).await {
            Ok(html) => html,
            Err(e) => return format!("Error performing search: {e}"),
        };

        let results = parse_results(&html, max_results);
        if results.is_empty() {
            return format!("No search results found for: {query}");
        }

        let mut output = vec![format!("Search results for: {query}\n")];
        for (i, result) in results.iter().enumerate() {
            output.push(format!("{}. {}", i + 1, result.title));
            output.push(format!("   URL: {}", result.url));
            if !result.snippet.is_empty() {
                output.push(format!("   {}", result.snippet));
            }
            output.push(String::new());
        }
        output.join("\n")
    }
}

async fn search(query: &str, timeout_secs: u64) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .user_agent("Mozilla/5.0 (compatible; grok-code/1.0)")
        .build()?;

    let response = client
        .get("https://html.duckduckgo.com/html/")
        .query(&[("q", query)])
        .send()
        .await?;
    if !response.status().is_success() {
        anyhow::bail!("HTTP {}", response.status().as_u16());
    }
    Ok(response.text().await?)
}

/// Pull result anchors and snippets out of the HTML by regex; the endpoint's
/// markup is stable enough that a parser dependency is not warranted.
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let anchor =
        Regex::new(r#"<a rel="nofollow" class="result__a" href="([^"]+)"[^>]*>([^<]+)</a>"#)
            .unwrap();
    let snippet = Regex::new(r#"<a class="result__snippet"[^>]*>([^<]+)</a>"#).unwrap();

    let snippets: Vec<String> =
        snippet.captures_iter(html).map(|c| c[1].trim().to_string()).collect();

    anchor
        .captures_iter(html)
        .take(max_results)
        .enumerate()
        .map(|(i, cap)| SearchResult {
            title: cap[2].trim().to_string(),
            url: decode_redirect(&cap[1]),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

/// The endpoint wraps result URLs in a redirect carrying the target in a
/// `uddg` query parameter; unwrap it back to the real URL.
fn decode_redirect(url: &str) -> String {
    let Some(query) = url.split('?').nth(1) else {
        return url.to_string();
    };
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("uddg=") {
            return percent_decode(value);
        }
    }
    url.to_string()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const SAMPLE: &str = concat!(
        r#"<a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdocs.rs%2Ftokio&rut=x">Tokio docs</a>"#,
        r##"<a class="result__snippet" href="#">Async runtime for Rust.</a>"##,
        r#"<a rel="nofollow" class="result__a" href="https://crates.io/crates/serde">Serde</a>"#,
        r##"<a class="result__snippet" href="#">Serialization framework.</a>"##,
    );

    #[test]
    fn parses_titles_urls_and_snippets() {
        let results = parse_results(SAMPLE, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Tokio docs");
        assert_eq!(results[0].snippet, "Async runtime for Rust.");
        assert_eq!(results[1].title, "Serde");
        assert_eq!(results[1].url, "https://crates.io/crates/serde");
    }

    #[test]
    fn redirect_urls_are_unwrapped() {
        let results = parse_results(SAMPLE, 5);
        assert_eq!(results[0].url, "https://docs.rs/tokio");
    }

    #[test]
    fn max_results_caps_output() {
        let results = parse_results(SAMPLE, 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn empty_html_yields_no_results() {
        assert!(parse_results("<html></html>", 5).is_empty());
    }

    #[test]
    fn percent_decode_handles_plus_and_hex() {
        assert_eq!(percent_decode("a+b%2Fc"), "a b/c");
        assert_eq!(percent_decode("plain"), "plain");
    }

    #[test]
    fn non_redirect_url_passes_through() {
        assert_eq!(decode_redirect("https://example.com/page"), "https://example.com/page");
    }

    #[tokio::test]
    async fn missing_query_is_error() {
        let tool = WebSearchTool::new(15);
        let out = tool.execute(&json!({})).await;
        assert!(out.starts_with("Error:"));
        assert!(out.contains("'query'"));
    }
}

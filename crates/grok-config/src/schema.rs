// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helpers.  `#[serde(default)]` on a numeric field always
/// falls back to zero, so every non-zero default needs a named function.
fn default_model() -> String {
    "grok-3-latest".to_string()
}
fn default_base_url() -> String {
    "https://api.x.ai/v1".to_string()
}
fn default_api_key_env() -> String {
    "XAI_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_retries() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    120
}
fn default_bash_timeout() -> u64 {
    120
}
fn default_bash_output_limit() -> usize {
    50_000
}
fn default_web_fetch_timeout() -> u64 {
    30
}
fn default_web_search_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Endpoint and transport settings for the chat completions API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name forwarded in the request body.
    #[serde(default = "default_model")]
    pub name: String,
    /// API base that ends before `/chat/completions`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key (read at runtime).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files.
    pub api_key: Option<String>,
    /// Sampling temperature (0.0–2.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Connection-error retries per streaming call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            api_key: None,
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ModelConfig {
    /// Resolve the API key: explicit value wins, then the configured
    /// environment variable.  Returns `None` when neither is set.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty()))
    }
}

/// Limits applied by the builtin tool suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default foreground bash timeout (per-call override allowed).
    #[serde(default = "default_bash_timeout")]
    pub bash_timeout_secs: u64,
    /// Byte cap applied to combined bash output before truncation.
    #[serde(default = "default_bash_output_limit")]
    pub bash_output_limit: usize,
    #[serde(default = "default_web_fetch_timeout")]
    pub web_fetch_timeout_secs: u64,
    #[serde(default = "default_web_search_timeout")]
    pub web_search_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bash_timeout_secs: default_bash_timeout(),
            bash_output_limit: default_bash_output_limit(),
            web_fetch_timeout_secs: default_web_fetch_timeout(),
            web_search_timeout_secs: default_web_search_timeout(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

/// Terminal AI coding assistant driving an xAI chat endpoint.
#[derive(Debug, Parser)]
#[command(name = "grok-code", version, about)]
pub struct Cli {
    /// Model name forwarded to the API.
    #[arg(long)]
    pub model: Option<String>,

    /// API base URL (ends before /chat/completions).
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key; falls back to the configured environment variable
    /// (default XAI_API_KEY).
    #[arg(long, env = "XAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Explicit config file merged on top of the standard locations.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Initial permission mode: auto, approve, or manual.
    #[arg(long)]
    pub mode: Option<String>,

    /// Run a single prompt non-interactively and exit.
    #[arg(long)]
    pub prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from([
            "grok-code",
            "--model",
            "grok-4",
            "--base-url",
            "http://localhost:9000/v1",
            "--mode",
            "auto",
        ]);
        assert_eq!(cli.model.as_deref(), Some("grok-4"));
        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:9000/v1"));
        assert_eq!(cli.mode.as_deref(), Some("auto"));
        assert!(cli.prompt.is_none());
    }

    #[test]
    fn defaults_are_empty() {
        let cli = Cli::parse_from(["grok-code"]);
        assert!(cli.model.is_none());
        assert!(cli.config.is_none());
    }
}

//! Runtime configuration: `.env` / environment first, CLI flags on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use agent_core::{LoopConfig, ThinkingConfig};
use agent_runtime::OllamaConfig;

use crate::cli::Cli;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Model override; the provider default is used when unset
    #[serde(default)]
    pub model: Option<String>,

    /// System prompt override
    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub thinking: ThinkingConfig,

    #[serde(default, rename = "loop")]
    pub loop_config: LoopConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.ollama = OllamaConfig::from_env();
        Ok(config)
    }

    /// Build from `AGENT_*` variables resolved through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.model = var("AGENT_MODEL");
        config.system_prompt = var("AGENT_SYSTEM_PROMPT");

        if let Some(style) = var("AGENT_THINK_STYLE") {
            config.thinking.style = style.parse().context("AGENT_THINK_STYLE")?;
        }
        if let Some(cot) = var("AGENT_COT") {
            config.thinking.cot = cot.parse().context("AGENT_COT")?;
        }
        if let Some(max) = var("AGENT_MAX_ITERATIONS") {
            config.thinking.max_iterations = max
                .trim()
                .parse()
                .with_context(|| format!("AGENT_MAX_ITERATIONS must be a number, got '{}'", max))?;
        }
        if let Some(max) = var("AGENT_MAX_TURNS") {
            config.loop_config.max_turns = max
                .trim()
                .parse()
                .with_context(|| format!("AGENT_MAX_TURNS must be a number, got '{}'", max))?;
        }

        Ok(config)
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(style) = cli.style {
            self.thinking.style = style;
        }
        if let Some(cot) = cli.cot {
            self.thinking.cot = cot;
        }
        if let Some(max_turns) = cli.max_turns {
            self.loop_config.max_turns = max_turns;
        }
        if let Some(model) = &cli.model {
            self.model = Some(model.clone());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{CotVisibility, ThinkStyle};
    use clap::Parser;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.thinking, ThinkingConfig::default());
        assert_eq!(config.loop_config.max_turns, 10);
        assert!(config.model.is_none());
    }

    #[test]
    fn test_env_values() {
        let config = Config::from_lookup(lookup(&[
            ("AGENT_MODEL", "qwen2.5"),
            ("AGENT_THINK_STYLE", "reactive"),
            ("AGENT_COT", "hidden"),
            ("AGENT_MAX_ITERATIONS", "5"),
            ("AGENT_MAX_TURNS", " 4 "),
            ("AGENT_SYSTEM_PROMPT", ""),
        ]))
        .unwrap();

        assert_eq!(config.model.as_deref(), Some("qwen2.5"));
        assert_eq!(config.thinking.style, ThinkStyle::ToolLoop);
        assert_eq!(config.thinking.cot, CotVisibility::Hidden);
        assert_eq!(config.thinking.max_iterations, 5);
        assert_eq!(config.loop_config.max_turns, 4);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn test_invalid_env_value() {
        assert!(Config::from_lookup(lookup(&[("AGENT_MAX_TURNS", "many")])).is_err());
        assert!(Config::from_lookup(lookup(&[("AGENT_THINK_STYLE", "daydream")])).is_err());
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = lookup(&[("AGENT_THINK_STYLE", "reactive"), ("AGENT_MAX_TURNS", "4")]);
        let cli = Cli::parse_from(["agent", "--style", "reflective", "--model", "llama3.1", "hi"]);
        let config = Config::from_lookup(env).unwrap().with_overrides(&cli);

        assert_eq!(config.thinking.style, ThinkStyle::Reflective);
        assert_eq!(config.loop_config.max_turns, 4);
        assert_eq!(config.model.as_deref(), Some("llama3.1"));
    }
}

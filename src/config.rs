//! Agent configuration
//!
//! Read from the environment (a `.env` file is honoured by the binary) and
//! overridden by CLI flags.

use crate::error::{AgentError, Result};
use std::path::PathBuf;

pub const DEFAULT_DISCOVERY_CONCURRENCY: usize = 6;
pub const MAX_DISCOVERY_CONCURRENCY: usize = 32;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_tool_iterations: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            timeout_secs: 60,
            max_tool_iterations: 15,
        }
    }
}

/// Where the semantic model comes from
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticLayerSource {
    Http { base_url: String, token: Option<String> },
    Fixture(PathBuf),
}

/// Prompt-context windows for the selectors
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow {
    pub model_messages: usize,
    pub field_messages: usize,
    pub max_chars: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            model_messages: 6,
            field_messages: 4,
            max_chars: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub semantic_layer: Option<SemanticLayerSource>,
    pub discovery_concurrency: usize,
    pub tool_binding_capacity: usize,
    pub context: ContextWindow,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            semantic_layer: None,
            discovery_concurrency: DEFAULT_DISCOVERY_CONCURRENCY,
            tool_binding_capacity: 8,
            context: ContextWindow::default(),
        }
    }
}

impl AgentConfig {
    /// Build from `SL_AGENT_*` / `OPENAI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.api_key = key;
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config.llm.model = model;
        }
        if let Some(t) = parse_env::<f32>("SL_AGENT_TEMPERATURE")? {
            config.llm.temperature = t;
        }
        if let Some(secs) = parse_env::<u64>("SL_AGENT_LLM_TIMEOUT_SECS")? {
            config.llm.timeout_secs = secs;
        }
        if let Some(n) = parse_env::<usize>("SL_AGENT_MAX_TOOL_ITERATIONS")? {
            config.llm.max_tool_iterations = n.max(1);
        }
        if let Some(n) = parse_env::<usize>("SL_AGENT_DISCOVERY_CONCURRENCY")? {
            config.discovery_concurrency = n;
        }
        if let Some(n) = parse_env::<usize>("SL_AGENT_TOOL_CACHE_CAPACITY")? {
            config.tool_binding_capacity = n.max(1);
        }

        if let Ok(path) = std::env::var("SL_AGENT_FIXTURE") {
            config.semantic_layer = Some(SemanticLayerSource::Fixture(PathBuf::from(path)));
        } else if let Ok(base_url) = std::env::var("SL_AGENT_SEMANTIC_URL") {
            config.semantic_layer = Some(SemanticLayerSource::Http {
                base_url,
                token: std::env::var("SL_AGENT_SEMANTIC_TOKEN").ok(),
            });
        }

        config.normalize();
        Ok(config)
    }

    pub fn normalize(&mut self) {
        self.discovery_concurrency = self
            .discovery_concurrency
            .clamp(1, MAX_DISCOVERY_CONCURRENCY);
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AgentError::Config(format!("Invalid value for {}: '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_is_clamped() {
        let mut config = AgentConfig {
            discovery_concurrency: 0,
            ..Default::default()
        };
        config.normalize();
        assert_eq!(config.discovery_concurrency, 1);

        config.discovery_concurrency = 500;
        config.normalize();
        assert_eq!(config.discovery_concurrency, MAX_DISCOVERY_CONCURRENCY);
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.discovery_concurrency, DEFAULT_DISCOVERY_CONCURRENCY);
        assert_eq!(config.context.model_messages, 6);
        assert_eq!(config.context.field_messages, 4);
    }
}

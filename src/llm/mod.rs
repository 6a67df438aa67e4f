//! Reasoning delegate
//!
//! The pipeline treats classification and selection as calls to an opaque
//! [`Reasoner`]. `content` is free text expected to carry a JSON block;
//! callers decode it through [`decode`] and must tolerate malformed output.

pub mod binding;
pub mod client;
pub mod decode;
pub mod scripted;

pub use binding::{ToolBindingCache, ToolSetKey};
pub use client::LlmClient;
pub use decode::{clamp_confidence, decode_strict, extract_json_block, DecodePath, Decoded};
pub use scripted::ScriptedReasoner;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool call executed during a reasoning loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub args: Value,
    pub output: Value,
    pub is_error: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    pub content: String,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
}

impl Reasoning {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_results: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Run one prompt. `allowed_tools` may be empty, in which case the
    /// delegate must answer without calling tools.
    async fn reason(&self, prompt: &str, allowed_tools: &[&str]) -> Result<Reasoning>;
}

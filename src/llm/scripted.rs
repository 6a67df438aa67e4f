use crate::error::{AgentError, Result};
use crate::llm::{Reasoner, Reasoning};
use async_trait::async_trait;
use std::sync::Mutex;

/// Reasoner that answers from canned replies.
///
/// The first rule whose needle occurs in the prompt wins. With no matching
/// rule the reply is empty, which sends every caller down its fallback path.
#[derive(Default)]
pub struct ScriptedReasoner {
    rules: Vec<(String, String)>,
    failures: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }

    /// Return an error for prompts containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_string());
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn reason(&self, prompt: &str, _allowed_tools: &[&str]) -> Result<Reasoning> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(needle) = self.failures.iter().find(|n| prompt.contains(n.as_str())) {
            return Err(AgentError::Llm(format!("scripted failure on '{}'", needle)));
        }
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_default();
        Ok(Reasoning::text(reply))
    }
}

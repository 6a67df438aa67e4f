use crate::config::LlmConfig;
use crate::error::{AgentError, Result};
use crate::llm::{Reasoner, Reasoning, ToolBindingCache, ToolResult, ToolSetKey};
use crate::tools::ToolRuntime;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str =
    "You are a precise assistant for a semantic data layer. When asked for JSON, return only valid JSON.";

/// OpenAI-compatible chat completions client.
///
/// When a prompt is granted tools, the client runs a bounded function-calling
/// loop, executing calls through the [`ToolRuntime`].
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    runtime: Option<ToolRuntime>,
    bindings: Mutex<ToolBindingCache>,
}

impl LlmClient {
    pub fn new(config: LlmConfig, runtime: Option<ToolRuntime>, binding_capacity: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            runtime,
            bindings: Mutex::new(ToolBindingCache::new(binding_capacity)),
        })
    }

    fn tool_definitions(&self, allowed_tools: &[&str]) -> Arc<Vec<Value>> {
        let key = ToolSetKey::new(allowed_tools);
        if key.is_empty() || self.runtime.is_none() {
            return Arc::new(Vec::new());
        }
        match self.bindings.lock() {
            Ok(mut cache) => cache.get_or_insert_with(key, build_definitions),
            Err(_) => Arc::new(build_definitions(&key)),
        }
    }

    async fn call_llm(&self, messages: &[Value], tools: &[Value]) -> Result<Value> {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Llm(format!("LLM API call failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Llm(format!("LLM API returned {}: {}", status, text)));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        response_json["choices"][0]["message"]
            .as_object()
            .map(|m| Value::Object(m.clone()))
            .ok_or_else(|| AgentError::Llm("No message in LLM response".to_string()))
    }
}

#[async_trait]
impl Reasoner for LlmClient {
    async fn reason(&self, prompt: &str, allowed_tools: &[&str]) -> Result<Reasoning> {
        let tools = self.tool_definitions(allowed_tools);
        let mut messages = vec![
            json!({"role": "system", "content": SYSTEM_PROMPT}),
            json!({"role": "user", "content": prompt}),
        ];
        let mut tool_results = Vec::new();

        for iteration in 1..=self.config.max_tool_iterations {
            debug!("LLM call {} ({} tools bound)", iteration, tools.len());
            let message = self.call_llm(&messages, &tools).await?;

            let calls = message["tool_calls"].as_array().cloned().unwrap_or_default();
            let runtime = match (&self.runtime, calls.is_empty()) {
                (Some(rt), false) => rt,
                _ => {
                    let content = message["content"].as_str().unwrap_or("").to_string();
                    return Ok(Reasoning {
                        content,
                        tool_results,
                    });
                }
            };

            messages.push(message.clone());
            for call in calls {
                let id = call["id"].as_str().unwrap_or("").to_string();
                let name = call["function"]["name"].as_str().unwrap_or("").to_string();
                let args: Value = call["function"]["arguments"]
                    .as_str()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_else(|| json!({}));

                let outcome = if allowed_tools.contains(&name.as_str()) {
                    info!("🔧 Tool call: {}", name);
                    runtime.execute(&name, &args).await
                } else {
                    Err(AgentError::Tool(format!("Tool '{}' is not allowed here", name)))
                };
                let (output, is_error) = match outcome {
                    Ok(v) => (v, false),
                    Err(e) => {
                        warn!("Tool {} failed: {}", name, e);
                        (json!({"error": e.to_string()}), true)
                    }
                };

                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": output.to_string(),
                }));
                tool_results.push(ToolResult {
                    tool_name: name,
                    args,
                    output,
                    is_error,
                });
            }
        }

        Err(AgentError::IterationLimit(self.config.max_tool_iterations))
    }
}

fn build_definitions(key: &ToolSetKey) -> Vec<Value> {
    key.names().filter_map(ToolRuntime::definition).collect()
}

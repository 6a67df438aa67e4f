#![allow(dead_code)]

use async_trait::async_trait;
use sl_agent::config::AgentConfig;
use sl_agent::llm::ScriptedReasoner;
use sl_agent::schema::{ExploreInfo, Field, ModelInfo};
use sl_agent::tools::{InMemorySemanticLayer, MaterializedQuery, SemanticLayer};
use sl_agent::{AgentError, ChatSession, FieldSelection, Orchestrator, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const STUB_QUERY: &str = "SELECT region, total_sales FROM orders GROUP BY 1";

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/ecommerce.json")
}

/// Fixture-backed layer that counts calls and injects failures.
pub struct TestLayer {
    inner: InMemorySemanticLayer,
    pub list_models_calls: AtomicUsize,
    pub materialize_calls: AtomicUsize,
    fail_models: bool,
    fail_explores_for: HashSet<String>,
    fail_fields_for: HashSet<String>,
    fail_materialize: bool,
    stub_query: Option<String>,
    list_models_delay: Option<Duration>,
}

impl TestLayer {
    pub fn new() -> Self {
        Self {
            inner: InMemorySemanticLayer::load(fixture_path()).expect("fixture loads"),
            list_models_calls: AtomicUsize::new(0),
            materialize_calls: AtomicUsize::new(0),
            fail_models: false,
            fail_explores_for: HashSet::new(),
            fail_fields_for: HashSet::new(),
            fail_materialize: false,
            stub_query: None,
            list_models_delay: None,
        }
    }

    pub fn failing_models(mut self) -> Self {
        self.fail_models = true;
        self
    }

    pub fn failing_explores_for(mut self, model: &str) -> Self {
        self.fail_explores_for.insert(model.to_string());
        self
    }

    pub fn failing_fields_for(mut self, model: &str, explore: &str) -> Self {
        self.fail_fields_for.insert(format!("{}.{}", model, explore));
        self
    }

    pub fn failing_materialize(mut self) -> Self {
        self.fail_materialize = true;
        self
    }

    pub fn with_stub_query(mut self, query: &str) -> Self {
        self.stub_query = Some(query.to_string());
        self
    }

    pub fn with_list_models_delay(mut self, delay: Duration) -> Self {
        self.list_models_delay = Some(delay);
        self
    }

    pub fn list_models_count(&self) -> usize {
        self.list_models_calls.load(Ordering::SeqCst)
    }

    pub fn materialize_count(&self) -> usize {
        self.materialize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SemanticLayer for TestLayer {
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.list_models_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_models_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_models {
            return Err(AgentError::Tool("semantic layer unavailable".to_string()));
        }
        self.inner.list_models().await
    }

    async fn list_explores(&self, model: &str) -> Result<Vec<ExploreInfo>> {
        if self.fail_explores_for.contains(model) {
            return Err(AgentError::Tool(format!("permission denied for {}", model)));
        }
        self.inner.list_explores(model).await
    }

    async fn list_dimensions(&self, model: &str, explore: &str) -> Result<Vec<Field>> {
        if self.fail_fields_for.contains(&format!("{}.{}", model, explore)) {
            return Err(AgentError::Tool("timeout".to_string()));
        }
        self.inner.list_dimensions(model, explore).await
    }

    async fn list_measures(&self, model: &str, explore: &str) -> Result<Vec<Field>> {
        self.inner.list_measures(model, explore).await
    }

    async fn materialize_query(&self, selection: &FieldSelection) -> Result<MaterializedQuery> {
        self.materialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_materialize {
            return Err(AgentError::Tool("query service returned 500".to_string()));
        }
        match &self.stub_query {
            Some(q) => Ok(MaterializedQuery { query_text: q.clone() }),
            None => self.inner.materialize_query(selection).await,
        }
    }
}

pub fn session(layer: Arc<TestLayer>, reasoner: Arc<ScriptedReasoner>) -> ChatSession {
    ChatSession::new(Orchestrator::with_layer(layer, reasoner, &AgentConfig::default()))
}

pub fn classify_reply(intent: &str, confidence: f64) -> String {
    format!(
        "```json\n{{\"intent\": \"{}\", \"confidence\": {}, \"reasoning\": \"scripted\"}}\n```",
        intent, confidence
    )
}

pub fn model_reply(model: &str, explore: &str, confidence: f64) -> String {
    format!(
        "{{\"model\": \"{}\", \"explore\": \"{}\", \"confidence\": {}, \"reasoning\": \"matches sales terms\"}}",
        model, explore, confidence
    )
}

//! HTTP semantic layer
//!
//! REST client for a semantic-query gateway exposing the listing and
//! materialization endpoints.

use crate::error::{AgentError, Result};
use crate::schema::{ExploreInfo, Field, ModelInfo};
use crate::state::FieldSelection;
use crate::tools::{MaterializedQuery, SemanticLayer};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub struct HttpSemanticLayer {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpSemanticLayer {
    pub fn new(base_url: &str, token: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to create HTTP client: {}", e)))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| AgentError::Config(format!("Invalid semantic layer URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AgentError::Config(format!("Semantic layer URL '{}' cannot be a base", base_url)));
        }
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Endpoint URL under the base path; each segment is percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AgentError::Config(format!("Semantic layer URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        debug!("GET {}", url);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| AgentError::Tool(format!("GET {} failed: {}", path, e)))?;

        if !response.status().is_success() {
            return Err(AgentError::Tool(format!(
                "GET {} returned {}",
                path,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::Tool(format!("Invalid response from {}: {}", path, e)))
    }
}

#[async_trait]
impl SemanticLayer for HttpSemanticLayer {
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.get(&["models"]).await
    }

    async fn list_explores(&self, model: &str) -> Result<Vec<ExploreInfo>> {
        self.get(&["models", model, "explores"]).await
    }

    async fn list_dimensions(&self, model: &str, explore: &str) -> Result<Vec<Field>> {
        self.get(&["models", model, "explores", explore, "dimensions"]).await
    }

    async fn list_measures(&self, model: &str, explore: &str) -> Result<Vec<Field>> {
        self.get(&["models", model, "explores", explore, "measures"]).await
    }

    async fn materialize_query(&self, selection: &FieldSelection) -> Result<MaterializedQuery> {
        let url = self.endpoint(&["queries", "sql"])?;
        debug!("POST {}", url);
        let response = self
            .authorize(self.client.post(url))
            .json(selection)
            .send()
            .await
            .map_err(|e| AgentError::Tool(format!("materialize_query failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Tool(format!(
                "materialize_query returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::Tool(format!("Invalid materialize_query response: {}", e)))
    }
}

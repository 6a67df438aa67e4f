//! In-memory semantic layer
//!
//! Loads a project (models → explores → fields) from a JSON fixture and
//! serves the tool contract from memory. Used for offline sessions and tests.

use crate::error::{AgentError, Result};
use crate::schema::{ExploreInfo, Field, ModelInfo};
use crate::state::FieldSelection;
use crate::tools::{MaterializedQuery, SemanticLayer};
use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// JSON representation of an explore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploreJson {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dimensions: Vec<Field>,
    #[serde(default)]
    pub measures: Vec<Field>,
}

/// JSON representation of a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelJson {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub explores: Vec<ExploreJson>,
}

/// Fixture file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectJson {
    pub models: Vec<ModelJson>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySemanticLayer {
    project: ProjectJson,
}

impl InMemorySemanticLayer {
    pub fn new(project: ProjectJson) -> Self {
        Self { project }
    }

    pub fn from_json(json_str: &str) -> Result<Self> {
        let project: ProjectJson = serde_json::from_str(json_str)
            .map_err(|e| AgentError::Config(format!("Failed to parse project fixture: {}", e)))?;
        Ok(Self::new(project))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    fn model(&self, model: &str) -> Result<&ModelJson> {
        self.project
            .models
            .iter()
            .find(|m| m.name == model)
            .ok_or_else(|| AgentError::Tool(format!("Unknown model '{}'", model)))
    }

    fn explore(&self, model: &str, explore: &str) -> Result<&ExploreJson> {
        self.model(model)?
            .explores
            .iter()
            .find(|e| e.name == explore)
            .ok_or_else(|| AgentError::Tool(format!("Unknown explore '{}.{}'", model, explore)))
    }
}

#[async_trait]
impl SemanticLayer for InMemorySemanticLayer {
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(self
            .project
            .models
            .iter()
            .map(|m| ModelInfo {
                name: m.name.clone(),
                label: m.label.clone(),
            })
            .collect())
    }

    async fn list_explores(&self, model: &str) -> Result<Vec<ExploreInfo>> {
        Ok(self
            .model(model)?
            .explores
            .iter()
            .map(|e| ExploreInfo {
                name: e.name.clone(),
                label: e.label.clone(),
                description: e.description.clone(),
            })
            .collect())
    }

    async fn list_dimensions(&self, model: &str, explore: &str) -> Result<Vec<Field>> {
        Ok(self.explore(model, explore)?.dimensions.clone())
    }

    async fn list_measures(&self, model: &str, explore: &str) -> Result<Vec<Field>> {
        Ok(self.explore(model, explore)?.measures.clone())
    }

    async fn materialize_query(&self, selection: &FieldSelection) -> Result<MaterializedQuery> {
        let explore = self.explore(&selection.model, &selection.explore)?;
        let lookup = |name: &str| -> Result<String> {
            explore
                .dimensions
                .iter()
                .chain(explore.measures.iter())
                .find(|f| f.name == name)
                .map(|f| f.sql.clone().unwrap_or_else(|| f.name.clone()))
                .ok_or_else(|| AgentError::Tool(format!("Unknown field '{}'", name)))
        };

        let mut columns = Vec::new();
        for name in selection.dimensions.iter().chain(selection.measures.iter()) {
            columns.push(format!("  {} AS {}", lookup(name)?, name.replace('.', "_")));
        }
        if columns.is_empty() {
            return Err(AgentError::Tool("Query has no fields".to_string()));
        }

        let mut sql = format!(
            "SELECT\n{}\nFROM {}.{}",
            columns.join(",\n"),
            selection.model,
            selection.explore
        );
        if !selection.filters.is_empty() {
            let mut predicates = Vec::new();
            for (name, value) in &selection.filters {
                predicates.push(format!("{} = '{}'", lookup(name)?, value.replace('\'', "''")));
            }
            sql.push_str(&format!("\nWHERE {}", predicates.join("\n  AND ")));
        }
        if !selection.dimensions.is_empty() && !selection.measures.is_empty() {
            sql.push_str(&format!(
                "\nGROUP BY {}",
                (1..=selection.dimensions.len()).join(", ")
            ));
        }

        Ok(MaterializedQuery { query_text: sql })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "models": [{
            "name": "sales",
            "label": "Sales",
            "explores": [{
                "name": "orders",
                "description": "Order lines",
                "dimensions": [{"name": "orders.region", "type": "string", "sql": "${TABLE}.region"}],
                "measures": [{"name": "orders.total_sales", "type": "sum"}]
            }]
        }]
    }"#;

    #[tokio::test]
    async fn test_listing_from_fixture() {
        let layer = InMemorySemanticLayer::from_json(FIXTURE).unwrap();
        let models = layer.list_models().await.unwrap();
        assert_eq!(models[0].name, "sales");
        let explores = layer.list_explores("sales").await.unwrap();
        assert_eq!(explores[0].description, "Order lines");
        assert!(layer.list_explores("finance").await.is_err());
    }

    #[tokio::test]
    async fn test_materialize_uses_field_sql_and_groups_dimensions() {
        let layer = InMemorySemanticLayer::from_json(FIXTURE).unwrap();
        let mut selection = FieldSelection::for_explore("sales", "orders");
        selection.dimensions.push("orders.region".to_string());
        selection.measures.push("orders.total_sales".to_string());
        selection.filters.insert("orders.region".to_string(), "EMEA".to_string());

        let query = layer.materialize_query(&selection).await.unwrap();
        assert!(query.query_text.contains("${TABLE}.region AS orders_region"));
        assert!(query.query_text.contains("WHERE ${TABLE}.region = 'EMEA'"));
        assert!(query.query_text.ends_with("GROUP BY 1"));
    }

    #[tokio::test]
    async fn test_materialize_rejects_unknown_field() {
        let layer = InMemorySemanticLayer::from_json(FIXTURE).unwrap();
        let mut selection = FieldSelection::for_explore("sales", "orders");
        selection.measures.push("orders.made_up".to_string());
        assert!(layer.materialize_query(&selection).await.is_err());
    }
}

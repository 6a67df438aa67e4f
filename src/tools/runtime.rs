use crate::error::{AgentError, Result};
use crate::state::FieldSelection;
use crate::tools::{
    SemanticLayer, LIST_DIMENSIONS, LIST_EXPLORES, LIST_MEASURES, LIST_MODELS, MATERIALIZE_QUERY,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Name-based dispatch of tool calls issued by the reasoning loop.
#[derive(Clone)]
pub struct ToolRuntime {
    pub layer: Arc<dyn SemanticLayer>,
}

impl ToolRuntime {
    pub fn new(layer: Arc<dyn SemanticLayer>) -> Self {
        Self { layer }
    }

    pub async fn execute(&self, tool_name: &str, args: &Value) -> Result<Value> {
        match tool_name {
            LIST_MODELS => Ok(serde_json::to_value(self.layer.list_models().await?)?),
            LIST_EXPLORES => {
                let model = required_arg(tool_name, args, "model")?;
                Ok(serde_json::to_value(self.layer.list_explores(model).await?)?)
            }
            LIST_DIMENSIONS => {
                let model = required_arg(tool_name, args, "model")?;
                let explore = required_arg(tool_name, args, "explore")?;
                Ok(serde_json::to_value(self.layer.list_dimensions(model, explore).await?)?)
            }
            LIST_MEASURES => {
                let model = required_arg(tool_name, args, "model")?;
                let explore = required_arg(tool_name, args, "explore")?;
                Ok(serde_json::to_value(self.layer.list_measures(model, explore).await?)?)
            }
            MATERIALIZE_QUERY => {
                let selection: FieldSelection = serde_json::from_value(args.clone())
                    .map_err(|e| AgentError::Tool(format!("Bad materialize_query args: {}", e)))?;
                Ok(serde_json::to_value(self.layer.materialize_query(&selection).await?)?)
            }
            other => Err(AgentError::Tool(format!("Unknown tool '{}'", other))),
        }
    }

    /// Function-calling definition for a tool, `None` for unknown names.
    pub fn definition(tool_name: &str) -> Option<Value> {
        let explore_args = json!({
            "type": "object",
            "properties": {
                "model": {"type": "string"},
                "explore": {"type": "string"}
            },
            "required": ["model", "explore"]
        });
        let (description, parameters) = match tool_name {
            LIST_MODELS => (
                "List the semantic models in the project",
                json!({"type": "object", "properties": {}}),
            ),
            LIST_EXPLORES => (
                "List the explores of a model",
                json!({
                    "type": "object",
                    "properties": {"model": {"type": "string"}},
                    "required": ["model"]
                }),
            ),
            LIST_DIMENSIONS => ("List the dimensions of an explore", explore_args),
            LIST_MEASURES => ("List the measures of an explore", explore_args),
            MATERIALIZE_QUERY => (
                "Generate the query text for a field selection",
                json!({
                    "type": "object",
                    "properties": {
                        "model": {"type": "string"},
                        "explore": {"type": "string"},
                        "dimensions": {"type": "array", "items": {"type": "string"}},
                        "measures": {"type": "array", "items": {"type": "string"}},
                        "filters": {"type": "object", "additionalProperties": {"type": "string"}}
                    },
                    "required": ["model", "explore"]
                }),
            ),
            _ => return None,
        };
        Some(json!({
            "type": "function",
            "function": {
                "name": tool_name,
                "description": description,
                "parameters": parameters,
            }
        }))
    }
}

fn required_arg<'a>(tool_name: &str, args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AgentError::Tool(format!("missing argument '{}' for {}", key, tool_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::InMemorySemanticLayer;

    fn runtime() -> ToolRuntime {
        let layer = InMemorySemanticLayer::from_json(
            r#"{"models": [{"name": "sales", "explores": [{"name": "orders",
                "dimensions": [{"name": "orders.region", "type": "string"}],
                "measures": [{"name": "orders.count", "type": "count"}]}]}]}"#,
        )
        .unwrap();
        ToolRuntime::new(Arc::new(layer))
    }

    #[tokio::test]
    async fn test_execute_dispatches_by_name() {
        let rt = runtime();
        let dims = rt
            .execute(LIST_DIMENSIONS, &json!({"model": "sales", "explore": "orders"}))
            .await
            .unwrap();
        assert_eq!(dims[0]["name"], "orders.region");

        let query = rt
            .execute(
                MATERIALIZE_QUERY,
                &json!({"model": "sales", "explore": "orders", "measures": ["orders.count"]}),
            )
            .await
            .unwrap();
        assert!(query["query_text"].as_str().unwrap().contains("orders.count"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        assert!(runtime().execute("drop_tables", &json!({})).await.is_err());
        assert!(ToolRuntime::definition("drop_tables").is_none());
    }

    #[tokio::test]
    async fn test_missing_arguments_are_reported() {
        let rt = runtime();
        let err = rt
            .execute(LIST_DIMENSIONS, &json!({"model": "sales"}))
            .await
            .unwrap_err();
        assert!(matches!(&err, AgentError::Tool(msg) if msg.contains("'explore'")));

        let err = rt.execute(LIST_EXPLORES, &json!({})).await.unwrap_err();
        assert!(matches!(&err, AgentError::Tool(msg) if msg.contains("'model'")));
    }
}

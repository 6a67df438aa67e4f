//! Semantic Layer Tools
//!
//! Capability interface onto the external semantic-query service. The
//! orchestrator is written once against [`SemanticLayer`]; the in-memory and
//! HTTP implementations are interchangeable.

pub mod http;
pub mod memory;
pub mod runtime;

pub use http::HttpSemanticLayer;
pub use memory::InMemorySemanticLayer;
pub use runtime::ToolRuntime;

use crate::error::Result;
use crate::schema::{ExploreInfo, Field, ModelInfo};
use crate::state::{FieldSelection, Intent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const LIST_MODELS: &str = "list_models";
pub const LIST_EXPLORES: &str = "list_explores";
pub const LIST_DIMENSIONS: &str = "list_dimensions";
pub const LIST_MEASURES: &str = "list_measures";
pub const MATERIALIZE_QUERY: &str = "materialize_query";

/// Output of `materialize_query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedQuery {
    pub query_text: String,
}

/// Read-only listing calls plus the one side-effecting materialization.
#[async_trait]
pub trait SemanticLayer: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    async fn list_explores(&self, model: &str) -> Result<Vec<ExploreInfo>>;

    async fn list_dimensions(&self, model: &str, explore: &str) -> Result<Vec<Field>>;

    async fn list_measures(&self, model: &str, explore: &str) -> Result<Vec<Field>>;

    async fn materialize_query(&self, selection: &FieldSelection) -> Result<MaterializedQuery>;
}

/// Tools a reasoning call may be granted for a given intent.
pub fn tools_for_intent(intent: Intent) -> Vec<&'static str> {
    match intent {
        Intent::Query | Intent::FollowUp => vec![
            LIST_MODELS,
            LIST_EXPLORES,
            LIST_DIMENSIONS,
            LIST_MEASURES,
            MATERIALIZE_QUERY,
        ],
        Intent::SchemaOverview | Intent::ExploreDetails | Intent::FieldExplain => {
            vec![LIST_MODELS, LIST_EXPLORES, LIST_DIMENSIONS, LIST_MEASURES]
        }
    }
}

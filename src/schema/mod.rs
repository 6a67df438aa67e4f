//! Project Schema
//!
//! Snapshot of the semantic model (models → explores → dimensions/measures)
//! discovered once per session and read by every downstream node.

pub mod cache;

pub use cache::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dimension or measure as returned by the semantic layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    pub fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            label: String::new(),
            field_type: field_type.to_string(),
            sql: None,
            description: None,
        }
    }

    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Dimension,
    Measure,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Dimension => "dimension",
            FieldKind::Measure => "measure",
        }
    }
}

/// `list_models` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub label: String,
}

/// `list_explores` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreInfo {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreSummary {
    pub name: String,
    pub label: String,
    pub description: String,
    pub dimension_count: usize,
    pub measure_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub label: String,
    pub explores: Vec<ExploreSummary>,
}

/// Full field listing for one explore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreDetail {
    pub model: String,
    pub name: String,
    pub label: String,
    pub description: String,
    pub dimensions: Vec<Field>,
    pub measures: Vec<Field>,
}

impl ExploreDetail {
    pub fn key(&self) -> String {
        explore_key(&self.model, &self.name)
    }

    /// Look up a field by its exact name.
    pub fn field(&self, name: &str) -> Option<(&Field, FieldKind)> {
        self.dimensions
            .iter()
            .find(|f| f.name == name)
            .map(|f| (f, FieldKind::Dimension))
            .or_else(|| {
                self.measures
                    .iter()
                    .find(|f| f.name == name)
                    .map(|f| (f, FieldKind::Measure))
            })
    }

    pub fn fields(&self) -> impl Iterator<Item = (&Field, FieldKind)> {
        self.dimensions
            .iter()
            .map(|f| (f, FieldKind::Dimension))
            .chain(self.measures.iter().map(|f| (f, FieldKind::Measure)))
    }

    pub fn summary(&self) -> ExploreSummary {
        ExploreSummary {
            name: self.name.clone(),
            label: self.label.clone(),
            description: self.description.clone(),
            dimension_count: self.dimensions.len(),
            measure_count: self.measures.len(),
        }
    }
}

/// Immutable-once-built schema snapshot.
///
/// `explores` is keyed by `model.explore`; every explore listed under a model
/// has an entry here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSchema {
    pub models: Vec<ModelSummary>,
    pub explores: BTreeMap<String, ExploreDetail>,
}

impl ProjectSchema {
    pub fn explore(&self, model: &str, explore: &str) -> Option<&ExploreDetail> {
        self.explores.get(&explore_key(model, explore))
    }

    pub fn model(&self, name: &str) -> Option<&ModelSummary> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn explore_count(&self) -> usize {
        self.explores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.explores.is_empty()
    }
}

pub fn explore_key(model: &str, explore: &str) -> String {
    format!("{}.{}", model, explore)
}

//! Pipeline nodes
//!
//! Every node is a function of `(&TurnState, &NodeContext) -> StateUpdate`.
//! Failures are reported through `StateUpdate::error` and routed by the
//! orchestrator; nodes never panic or short-circuit the graph themselves.

pub mod clarify;
pub mod classify;
pub mod confidence;
pub mod discover;
pub mod field_explain;
pub mod format_response;
pub mod materialize;
pub mod schema_explore;
pub mod select_fields;
pub mod select_model;

use crate::config::ContextWindow;
use crate::llm::Reasoner;
use crate::schema::SchemaCache;
use crate::state::{FieldSelection, Intent, StateUpdate, TurnPhase, TurnState};
use crate::tools::SemanticLayer;
use itertools::Itertools;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Collaborators shared by the nodes of one session
#[derive(Clone)]
pub struct NodeContext {
    pub schema_cache: Arc<SchemaCache>,
    pub reasoner: Arc<dyn Reasoner>,
    pub layer: Arc<dyn SemanticLayer>,
    pub context: ContextWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    DiscoverSchema,
    ClassifyIntent,
    SelectModel,
    SelectFields,
    ConfidenceCheck,
    AskClarify,
    MaterializeQuery,
    ExploreSchema,
    ExplainField,
    FormatResponse,
}

impl NodeId {
    pub fn name(&self) -> &'static str {
        match self {
            NodeId::DiscoverSchema => "discover_schema",
            NodeId::ClassifyIntent => "classify_intent",
            NodeId::SelectModel => "select_model",
            NodeId::SelectFields => "select_fields",
            NodeId::ConfidenceCheck => "confidence_check",
            NodeId::AskClarify => "ask_clarify",
            NodeId::MaterializeQuery => "materialize_query",
            NodeId::ExploreSchema => "schema_explore",
            NodeId::ExplainField => "field_explain",
            NodeId::FormatResponse => "format_response",
        }
    }

    /// Phase the turn is in once this node has completed.
    pub fn phase(&self) -> TurnPhase {
        match self {
            NodeId::DiscoverSchema => TurnPhase::SchemaDiscovered,
            NodeId::ClassifyIntent => TurnPhase::IntentClassified,
            NodeId::SelectModel => TurnPhase::ModelSelected,
            NodeId::SelectFields => TurnPhase::FieldsSelected,
            NodeId::ConfidenceCheck => TurnPhase::ConfidenceChecked,
            NodeId::AskClarify => TurnPhase::Clarifying,
            NodeId::MaterializeQuery => TurnPhase::QueryReady,
            NodeId::ExploreSchema | NodeId::ExplainField => TurnPhase::Explaining,
            NodeId::FormatResponse => TurnPhase::Done,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub async fn run_node(node: NodeId, state: &TurnState, ctx: &NodeContext) -> StateUpdate {
    debug!("Running node {}", node);
    match node {
        NodeId::DiscoverSchema => discover::discover_schema(state, ctx).await,
        NodeId::ClassifyIntent => classify::classify_intent(state, ctx).await,
        NodeId::SelectModel => select_model::select_model(state, ctx).await,
        NodeId::SelectFields => select_fields::select_fields(state, ctx).await,
        NodeId::ConfidenceCheck => confidence::confidence_check(state),
        NodeId::AskClarify => clarify::ask_clarify(state),
        NodeId::MaterializeQuery => materialize::materialize_query(state, ctx).await,
        NodeId::ExploreSchema => schema_explore::schema_explore(state),
        NodeId::ExplainField => field_explain::field_explain(state),
        NodeId::FormatResponse => format_response::format_response(state),
    }
}

/// Shown when discovery succeeded but every explore was omitted.
pub(crate) const NO_EXPLORES_MESSAGE: &str =
    "No explores could be loaded from the semantic layer, so there is nothing to answer from yet. \
     Could you check the semantic layer and try again with /reset?";

/// Recent conversation for a selector prompt. Follow-ups also see the last
/// materialized selection.
pub(crate) fn selector_context(state: &TurnState, messages: usize, max_chars: usize) -> String {
    let mut context = state.recent_context(messages, max_chars);
    if state.intent == Some(Intent::FollowUp) {
        if let Some(prev) = &state.previous_selection {
            if !context.is_empty() {
                context.push('\n');
            }
            context.push_str(&previous_selection_context(prev));
        }
    }
    if context.is_empty() {
        context = "None".to_string();
    }
    context
}

pub(crate) fn previous_selection_context(selection: &FieldSelection) -> String {
    let mut line = format!(
        "Previous selection: {} (dimensions: {}; measures: {}",
        selection.explore_key(),
        selection.dimensions.join(", "),
        selection.measures.join(", ")
    );
    if !selection.filters.is_empty() {
        line.push_str(&format!(
            "; filters: {}",
            selection.filters.iter().map(|(k, v)| format!("{} = {}", k, v)).join(", ")
        ));
    }
    line.push(')');
    line
}

/// Shorten text for trace lines without splitting a character.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

pub(crate) fn percent(confidence: f64) -> String {
    format!("{:.0}%", confidence * 100.0)
}

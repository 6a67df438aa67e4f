//! Turn orchestrator
//!
//! A fixed graph of nodes driven by an explicit transition table. After each
//! node the orchestrator derives a [`RouteKey`] from the updated state and
//! looks up the next step; there is no implicit fallthrough.
//!
//! ```text
//! discover_schema → classify_intent ─┬─ query/follow_up → select_model → select_fields
//!                                    │                       → confidence_check ─┬─ high → materialize_query ─┐
//!                                    │                                           └─ low  → ask_clarify ───────┤
//!                                    ├─ schema_overview/explore_details → schema_explore ─────────────────────┤
//!                                    └─ field_explain → field_explain ────────────────────────────────────────┤
//!                                                                                          format_response ←──┘
//! ```

use crate::config::AgentConfig;
use crate::error::{ErrorKind, TurnError};
use crate::llm::Reasoner;
use crate::nodes::confidence::{route_by_confidence, ConfidenceLevel};
use crate::nodes::{run_node, NodeContext, NodeId};
use crate::schema::SchemaCache;
use crate::state::{Intent, StateUpdate, TurnPhase, TurnState};
use crate::tools::SemanticLayer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on node executions per turn. The longest path is 7 nodes.
const MAX_STEPS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKey {
    Next,
    Intent(Intent),
    Confidence(ConfidenceLevel),
    /// A recoverable error was recorded; go straight to the formatter.
    Recover,
    /// A fatal error was recorded; end the turn without a response.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Node(NodeId),
    Done,
    Failed,
}

/// The transition table. `None` marks an edge the graph does not have.
pub fn transition(node: NodeId, key: RouteKey) -> Option<Transition> {
    use NodeId::*;
    use Transition::{Done, Failed, Node};

    match (node, key) {
        (_, RouteKey::Abort) => Some(Failed),
        (FormatResponse, _) => Some(Done),
        (_, RouteKey::Recover) => Some(Node(FormatResponse)),

        (DiscoverSchema, RouteKey::Next) => Some(Node(ClassifyIntent)),

        (ClassifyIntent, RouteKey::Intent(Intent::Query | Intent::FollowUp)) => Some(Node(SelectModel)),
        (ClassifyIntent, RouteKey::Intent(Intent::SchemaOverview | Intent::ExploreDetails)) => {
            Some(Node(ExploreSchema))
        }
        (ClassifyIntent, RouteKey::Intent(Intent::FieldExplain)) => Some(Node(ExplainField)),

        (SelectModel, RouteKey::Next) => Some(Node(SelectFields)),
        (SelectFields, RouteKey::Next) => Some(Node(ConfidenceCheck)),
        (ConfidenceCheck, RouteKey::Confidence(ConfidenceLevel::High)) => Some(Node(MaterializeQuery)),
        (ConfidenceCheck, RouteKey::Confidence(ConfidenceLevel::Low)) => Some(Node(AskClarify)),

        (AskClarify | MaterializeQuery | ExploreSchema | ExplainField, RouteKey::Next) => {
            Some(Node(FormatResponse))
        }
        _ => None,
    }
}

/// Intent routing; an unclassified turn is treated as a query.
pub fn route_by_intent(state: &TurnState) -> Intent {
    state.intent.unwrap_or(Intent::Query)
}

/// Routing key for the state produced by `node`.
pub fn route_key(node: NodeId, state: &TurnState) -> RouteKey {
    if let Some(err) = &state.error {
        let fatal = match err.kind {
            ErrorKind::Cancelled => true,
            ErrorKind::SchemaDiscoveryFailed => state.project_schema.is_none(),
            _ => false,
        };
        if fatal {
            return RouteKey::Abort;
        }
        if node != NodeId::FormatResponse {
            return RouteKey::Recover;
        }
    }
    match node {
        NodeId::ClassifyIntent => RouteKey::Intent(route_by_intent(state)),
        NodeId::ConfidenceCheck => RouteKey::Confidence(route_by_confidence(state)),
        _ => RouteKey::Next,
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub final_response: Option<String>,
    pub explanation_trace: Vec<String>,
    pub state: TurnState,
}

impl TurnOutcome {
    pub fn is_failed(&self) -> bool {
        self.state.phase == TurnPhase::Failed
    }
}

pub struct Orchestrator {
    ctx: NodeContext,
}

impl Orchestrator {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }

    /// Wire up an orchestrator with a fresh schema cache.
    pub fn with_layer(layer: Arc<dyn SemanticLayer>, reasoner: Arc<dyn Reasoner>, config: &AgentConfig) -> Self {
        let schema_cache = Arc::new(SchemaCache::new(Arc::clone(&layer), config.discovery_concurrency));
        Self::new(NodeContext {
            schema_cache,
            reasoner,
            layer,
            context: config.context,
        })
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.ctx.schema_cache
    }

    /// Run one conversational turn on top of `prior`.
    pub async fn process_turn(&self, utterance: &str, prior: &TurnState, cancel: &CancellationToken) -> TurnOutcome {
        let state = self.run(TurnState::begin_turn(prior, utterance), cancel).await;
        TurnOutcome {
            final_response: state.final_response.clone(),
            explanation_trace: state.explanation_trace.clone(),
            state,
        }
    }

    /// Drive `state` through the graph until a terminal phase.
    pub async fn run(&self, mut state: TurnState, cancel: &CancellationToken) -> TurnState {
        let mut node = NodeId::DiscoverSchema;

        for step in 1..=MAX_STEPS {
            debug!("Step {}: {}", step, node);
            let update = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                update = run_node(node, &state, &self.ctx) => Some(update),
            };

            let update = match update {
                Some(u) => u,
                None => {
                    warn!("Turn cancelled during {}", node);
                    let mut update = StateUpdate::new();
                    update.fail(TurnError::new(ErrorKind::Cancelled, format!("cancelled during {}", node)));
                    state.apply(update);
                    state.phase = TurnPhase::Failed;
                    return state;
                }
            };

            state.apply(update);
            state.phase = node.phase();

            let key = route_key(node, &state);
            match transition(node, key) {
                Some(Transition::Node(next)) => node = next,
                Some(Transition::Done) => {
                    state.phase = TurnPhase::Done;
                    info!("Turn complete after {} steps", step);
                    return state;
                }
                Some(Transition::Failed) => {
                    state.phase = TurnPhase::Failed;
                    error!("Turn failed at {}", node);
                    return state;
                }
                None => {
                    error!("No transition from {} on {:?}", node, key);
                    return self.abandon(state, format!("No transition from {} on {:?}", node, key));
                }
            }
        }

        error!("Turn exceeded {} steps", MAX_STEPS);
        self.abandon(state, format!("Turn exceeded {} steps", MAX_STEPS))
    }

    // Graph defect: answer the user anyway rather than leave the turn open.
    fn abandon(&self, mut state: TurnState, message: String) -> TurnState {
        let mut update = StateUpdate::new();
        update.fail(TurnError::new(ErrorKind::ExternalCallError, message));
        state.apply(update);
        let update = crate::nodes::format_response::format_response(&state);
        state.apply(update);
        state.phase = TurnPhase::Done;
        state
    }
}

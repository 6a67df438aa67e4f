use crate::error::Result;
use crate::graph::{Orchestrator, TurnOutcome};
use crate::nodes::schema_explore::format_schema_tree;
use crate::state::TurnState;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// A multi-turn conversation over one orchestrator.
///
/// Holds the state carried between turns: history, the discovered schema
/// and the last materialized selection.
pub struct ChatSession {
    pub id: Uuid,
    orchestrator: Orchestrator,
    state: TurnState,
}

impl ChatSession {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let id = Uuid::new_v4();
        info!("Started session {}", id);
        Self {
            id,
            orchestrator,
            state: TurnState::new(),
        }
    }

    pub async fn chat(&mut self, input: &str) -> TurnOutcome {
        self.chat_with_cancel(input, &CancellationToken::new()).await
    }

    pub async fn chat_with_cancel(&mut self, input: &str, cancel: &CancellationToken) -> TurnOutcome {
        let outcome = self.orchestrator.process_turn(input, &self.state, cancel).await;
        self.state = outcome.state.clone();
        outcome
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    /// Explanation trace of the last turn, one line per decision.
    pub fn show_trace(&self) -> String {
        if self.state.explanation_trace.is_empty() {
            return "No trace yet.".to_string();
        }
        self.state.explanation_trace.join("\n")
    }

    /// Schema tree for the project, discovering it first if needed.
    pub async fn schema_overview(&mut self) -> Result<String> {
        let report = self.orchestrator.schema_cache().discover().await?;
        let tree = format_schema_tree(&report.schema);
        self.state.project_schema = Some(report.schema);
        self.state.schema_loaded = true;
        Ok(tree)
    }

    /// Forget the conversation but keep the discovered schema.
    pub fn clear_history(&mut self) {
        self.state = self.state.cleared();
    }

    /// Forget everything, including the cached schema.
    pub async fn reset(&mut self) {
        self.orchestrator.schema_cache().invalidate().await;
        self.state = TurnState::new();
    }
}

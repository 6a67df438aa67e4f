use crate::error::{ErrorKind, TurnError};
use crate::nodes::NodeContext;
use crate::state::{StateUpdate, TurnState};
use tracing::{info, warn};

/// Materialize the selected fields into query text. Called once per turn;
/// a failure is surfaced to the user rather than retried.
pub async fn materialize_query(state: &TurnState, ctx: &NodeContext) -> StateUpdate {
    let mut update = StateUpdate::new();

    let selection = match &state.field_selection {
        Some(s) if !s.is_empty() => s,
        _ => {
            update.fail(TurnError::new(ErrorKind::ExternalCallError, "No fields selected to build a query from"));
            return update;
        }
    };

    // Only schema-backed names may reach the semantic layer.
    let explore = state.schema().and_then(|s| s.explore(&selection.model, &selection.explore));
    let unknown: Vec<&String> = match explore {
        Some(e) => selection.referenced_fields().filter(|f| e.field(f).is_none()).collect(),
        None => selection.referenced_fields().collect(),
    };
    if explore.is_none() || !unknown.is_empty() {
        update.fail(TurnError::new(
            ErrorKind::FieldHallucinationDetected,
            format!("Selection for {} references unknown fields", selection.explore_key()),
        ));
        return update;
    }

    match ctx.layer.materialize_query(selection).await {
        Ok(query) => {
            info!("🔧 Materialized query for {}", selection.explore_key());
            update.trace(format!("🔧 Generated query for {}", selection.explore_key()));
            update.generated_query = Some(query.query_text);
            update.previous_selection = Some(selection.clone());
        }
        Err(e) => {
            warn!("Query materialization failed: {}", e);
            update.fail(TurnError::new(
                ErrorKind::ExternalCallError,
                format!("Query generation failed: {}", e),
            ));
        }
    }
    update
}

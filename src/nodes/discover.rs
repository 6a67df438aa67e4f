use crate::error::{ErrorKind, TurnError};
use crate::nodes::NodeContext;
use crate::state::{StateUpdate, TurnState};
use tracing::{error, info};

/// Load the project schema into the turn. No-op once the session has it.
pub async fn discover_schema(state: &TurnState, ctx: &NodeContext) -> StateUpdate {
    let mut update = StateUpdate::new();
    if state.schema_loaded && state.project_schema.is_some() {
        return update;
    }

    match ctx.schema_cache.discover().await {
        Ok(report) => {
            if report.fetched {
                info!("✅ Schema loaded: {} explores", report.schema.explore_count());
            }
            if report.is_partial() {
                update.recover(ErrorKind::PartialSchema);
            }
            update.explanation_trace.extend(report.trace);
            update.project_schema = Some(report.schema);
            update.schema_loaded = Some(true);
        }
        Err(e) => {
            error!("Schema discovery failed: {}", e);
            update.fail(TurnError::from(&e));
        }
    }
    update
}

//! Final response composition.
//!
//! Deterministic: the same state always renders the same text. Every path
//! produces a non-empty message and appends it to the conversation.

use crate::error::{ErrorKind, TurnError};
use crate::state::{FieldSelection, Message, StateUpdate, TurnState};
use itertools::Itertools;

pub fn format_query_response(selection: &FieldSelection, query: &str) -> String {
    let mut lines = vec![
        format!("✅ **Query for {}**", selection.explore_key()),
        String::new(),
    ];
    if !selection.dimensions.is_empty() {
        lines.push(format!("**Dimensions:** {}", selection.dimensions.join(", ")));
    }
    if !selection.measures.is_empty() {
        lines.push(format!("**Measures:** {}", selection.measures.join(", ")));
    }
    if !selection.filters.is_empty() {
        lines.push(format!(
            "**Filters:** {}",
            selection.filters.iter().map(|(k, v)| format!("{} = {}", k, v)).join(", ")
        ));
    }
    lines.push(String::new());
    lines.push("```sql".to_string());
    lines.push(query.trim_end().to_string());
    lines.push("```".to_string());
    lines.push(String::new());
    lines.push("💡 You can refine this, e.g. \"Filter that to ...\" or \"Now break it down by ...\"".to_string());
    lines.join("\n")
}

/// User-facing text for an error absorbed during the turn.
pub fn format_error(error: &TurnError) -> String {
    match error.kind {
        ErrorKind::IterationLimitExceeded => {
            "This question is too complex for me to answer in one go. Could you break it into smaller questions?".to_string()
        }
        ErrorKind::Cancelled => "The request was cancelled. What would you like to ask next?".to_string(),
        ErrorKind::SchemaDiscoveryFailed => format!(
            "⚠️ I couldn't load the data model: {}\n\nCould you check the semantic layer connection and try again?",
            error.message
        ),
        _ => format!(
            "⚠️ Something went wrong: {}\n\nYour session is still active. Could you try rephrasing, or ask \"What data is available?\"",
            error.message
        ),
    }
}

pub fn format_response(state: &TurnState) -> StateUpdate {
    let mut update = StateUpdate::new();

    let (response, source) = if let Some(existing) = state.final_response.as_deref() {
        (existing.to_string(), None)
    } else if let (Some(query), Some(selection)) = (&state.generated_query, &state.field_selection) {
        (format_query_response(selection, query), Some("query"))
    } else if let Some(error) = &state.error {
        (format_error(error), Some("error"))
    } else {
        (
            "I couldn't produce an answer for that. Could you rephrase your question?".to_string(),
            Some("fallback"),
        )
    };

    if let Some(source) = source {
        update.final_response = Some(response.clone());
        update.trace(format!("📝 Composed {} response", source));
    } else {
        update.trace("📝 Response ready");
    }
    update.messages.push(Message::assistant(response));
    update
}

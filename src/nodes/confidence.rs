use crate::nodes::percent;
use crate::state::{StateUpdate, TurnState};

/// Minimum confidence for materializing a query without asking first.
pub const CONFIDENCE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfidenceLevel {
    High,
    Low,
}

pub fn route(confidence: f64, needs_clarification: bool) -> ConfidenceLevel {
    if confidence >= CONFIDENCE_THRESHOLD && !needs_clarification {
        ConfidenceLevel::High
    } else {
        ConfidenceLevel::Low
    }
}

pub fn route_by_confidence(state: &TurnState) -> ConfidenceLevel {
    let has_selection = state
        .field_selection
        .as_ref()
        .map(|s| !s.is_empty())
        .unwrap_or(false);
    if !has_selection {
        return ConfidenceLevel::Low;
    }
    route(state.confidence, state.needs_clarification)
}

/// Gate node: normalizes `needs_clarification` to agree with the route.
pub fn confidence_check(state: &TurnState) -> StateUpdate {
    let mut update = StateUpdate::new();
    let level = route_by_confidence(state);
    match level {
        ConfidenceLevel::High => {
            update.trace(format!(
                "✅ Confidence {} meets threshold {}",
                percent(state.confidence),
                percent(CONFIDENCE_THRESHOLD)
            ));
        }
        ConfidenceLevel::Low if state.confidence >= CONFIDENCE_THRESHOLD => {
            let reason = if state.needs_clarification {
                "clarifying questions are pending"
            } else {
                "no fields were selected"
            };
            update.trace(format!(
                "🤔 Confidence {} meets threshold {} but {}, asking for clarification",
                percent(state.confidence),
                percent(CONFIDENCE_THRESHOLD),
                reason
            ));
        }
        ConfidenceLevel::Low => {
            update.trace(format!(
                "🤔 Confidence {} below threshold {}, asking for clarification",
                percent(state.confidence),
                percent(CONFIDENCE_THRESHOLD)
            ));
        }
    }
    update.needs_clarification = Some(level == ConfidenceLevel::Low);
    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FieldSelection;

    fn state_with(confidence: f64, needs_clarification: bool) -> TurnState {
        let mut state = TurnState::new();
        let mut selection = FieldSelection::for_explore("sales", "orders");
        selection.measures.push("orders.count".to_string());
        state.field_selection = Some(selection);
        state.confidence = confidence;
        state.needs_clarification = needs_clarification;
        state
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(route_by_confidence(&state_with(0.8, false)), ConfidenceLevel::High);
        assert_eq!(route_by_confidence(&state_with(0.79, false)), ConfidenceLevel::Low);
    }

    #[test]
    fn test_pending_questions_force_low() {
        assert_eq!(route_by_confidence(&state_with(0.99, true)), ConfidenceLevel::Low);
    }

    #[test]
    fn test_empty_selection_is_low() {
        let mut state = state_with(0.95, false);
        state.field_selection = Some(FieldSelection::for_explore("sales", "orders"));
        assert_eq!(route_by_confidence(&state), ConfidenceLevel::Low);
    }

    #[test]
    fn test_gate_normalizes_flag() {
        let update = confidence_check(&state_with(0.4, false));
        assert_eq!(update.needs_clarification, Some(true));
    }

    #[test]
    fn test_trace_names_pending_questions() {
        let update = confidence_check(&state_with(0.95, true));
        let line = &update.explanation_trace[0];
        assert!(line.contains("questions are pending"));
        assert!(!line.contains("below threshold"));

        let update = confidence_check(&state_with(0.5, false));
        assert!(update.explanation_trace[0].contains("below threshold"));
    }
}

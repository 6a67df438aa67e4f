//! Field selection with anti-hallucination validation.
//!
//! Every name proposed by the reasoning delegate is canonicalized against the
//! chosen explore. Names that do not resolve are dropped, confidence is capped
//! and the user is asked what they meant.

use crate::error::{ErrorKind, TurnError};
use crate::llm::{clamp_confidence, decode_strict, DecodePath, Reasoner};
use crate::nodes::select_model::selection_tools;
use crate::nodes::{percent, selector_context, NodeContext};
use crate::prompts;
use crate::schema::{ExploreDetail, Field, FieldKind};
use crate::state::{FieldSelection, Intent, StateUpdate, TurnState};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Confidence ceiling once any proposed name has been rejected.
pub const HALLUCINATION_CONFIDENCE_CAP: f64 = 0.3;

#[derive(Debug, Default, Deserialize)]
pub struct FieldReply {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub field_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub uncertain_terms: Vec<String>,
    #[serde(default)]
    pub clarifying_questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldChoice {
    pub selection: FieldSelection,
    pub confidence: f64,
    pub field_mapping: BTreeMap<String, String>,
    pub uncertain_terms: Vec<String>,
    pub clarifying_questions: Vec<String>,
    /// Names that did not resolve to any field
    pub dropped: Vec<String>,
    /// Names moved between the dimension and measure lists
    pub moved: Vec<String>,
    pub reasoning: String,
}

/// Resolve a proposed name to a field in `explore`: exact, case-insensitive,
/// then a unique match on the unqualified suffix (`region` → `orders.region`).
pub fn canonicalize<'a>(explore: &'a ExploreDetail, name: &str) -> Option<(&'a Field, FieldKind)> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    if let Some(hit) = explore.field(name) {
        return Some(hit);
    }
    if let Some(hit) = explore.fields().find(|(f, _)| f.name.eq_ignore_ascii_case(name)) {
        return Some(hit);
    }
    if name.contains('.') {
        return None;
    }
    let suffix = format!(".{}", name.to_lowercase());
    let mut hits = explore
        .fields()
        .filter(|(f, _)| f.name.to_lowercase().ends_with(&suffix));
    match (hits.next(), hits.next()) {
        (Some(hit), None) => Some(hit),
        _ => None,
    }
}

fn filter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

fn ensure_question_mark(question: &str) -> String {
    let q = question.trim();
    if q.ends_with('?') {
        q.to_string()
    } else {
        format!("{}?", q)
    }
}

/// Validate a field reply against the explore. Pure; the result only ever
/// references fields that exist in `explore`.
pub fn validate_fields(explore: &ExploreDetail, reply: FieldReply) -> FieldChoice {
    let mut selection = FieldSelection::for_explore(&explore.model, &explore.name);
    let mut dropped = Vec::new();
    let mut moved = Vec::new();

    let proposed = reply
        .dimensions
        .iter()
        .map(|n| (n, FieldKind::Dimension))
        .chain(reply.measures.iter().map(|n| (n, FieldKind::Measure)));
    for (name, listed_as) in proposed {
        match canonicalize(explore, name) {
            Some((field, kind)) => {
                if kind != listed_as {
                    moved.push(field.name.clone());
                }
                match kind {
                    FieldKind::Dimension => push_unique(&mut selection.dimensions, &field.name),
                    FieldKind::Measure => push_unique(&mut selection.measures, &field.name),
                }
            }
            None => push_unique(&mut dropped, name.trim()),
        }
    }

    for (name, value) in &reply.filters {
        match canonicalize(explore, name) {
            Some((field, _)) => {
                selection.filters.insert(field.name.clone(), filter_value(value));
            }
            None => push_unique(&mut dropped, name.trim()),
        }
    }

    let mut uncertain_terms: Vec<String> = reply
        .uncertain_terms
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .collect();
    let mut field_mapping = BTreeMap::new();
    for (term, name) in reply.field_mapping {
        match canonicalize(explore, &name) {
            Some((field, _)) => {
                field_mapping.insert(term, field.name.clone());
            }
            None => push_unique(&mut uncertain_terms, &term),
        }
    }

    let mut confidence = clamp_confidence(reply.confidence.unwrap_or(0.0));
    let mut questions: Vec<String> = reply
        .clarifying_questions
        .iter()
        .filter(|q| !q.trim().is_empty())
        .map(|q| ensure_question_mark(q))
        .collect();

    if !dropped.is_empty() {
        confidence = confidence.min(HALLUCINATION_CONFIDENCE_CAP);
        for name in &dropped {
            push_unique(&mut uncertain_terms, name);
            questions.push(format!(
                "I couldn't find a field named '{}' in {}. Which field did you mean?",
                name, explore.name
            ));
        }
    }

    if selection.is_empty() {
        confidence = confidence.min(HALLUCINATION_CONFIDENCE_CAP);
        if questions.is_empty() {
            questions.push(format!(
                "Which measures or dimensions from {} should I use?",
                explore.name
            ));
        }
    }

    if questions.is_empty() {
        for term in &uncertain_terms {
            questions.push(format!("What did you mean by '{}'?", term));
        }
    }

    FieldChoice {
        selection,
        confidence,
        field_mapping,
        uncertain_terms,
        clarifying_questions: questions,
        dropped,
        moved,
        reasoning: reply.reasoning.unwrap_or_default(),
    }
}

fn field_listing(fields: &[Field]) -> String {
    if fields.is_empty() {
        return "(none)".to_string();
    }
    fields
        .iter()
        .map(|f| {
            let mut line = format!("- {} ({})", f.name, f.field_type);
            if !f.label.is_empty() && f.label != f.name {
                line.push_str(&format!(": {}", f.label));
            }
            if let Some(d) = f.description.as_deref().filter(|d| !d.is_empty()) {
                line.push_str(&format!(" - {}", d));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn select_fields(state: &TurnState, ctx: &NodeContext) -> StateUpdate {
    let mut update = StateUpdate::new();

    let current = match &state.field_selection {
        Some(s) => s,
        None => {
            update.trace("   Skipping field selection: no explore selected");
            return update;
        }
    };
    let explore = match state.schema().and_then(|s| s.explore(&current.model, &current.explore)) {
        Some(e) => e,
        None => {
            update.fail(TurnError::new(
                ErrorKind::ExternalCallError,
                format!("Explore {} is not in the discovered schema", current.explore_key()),
            ));
            return update;
        }
    };

    let context = selector_context(state, ctx.context.field_messages, ctx.context.max_chars);
    let prompt = prompts::field_selection(
        state.query_text(),
        &explore.model,
        &explore.name,
        &field_listing(&explore.dimensions),
        &field_listing(&explore.measures),
        &context,
    );

    let intent = state.intent.unwrap_or(Intent::Query);
    let reply = match ctx.reasoner.reason(&prompt, &selection_tools(intent)).await {
        Ok(r) => r,
        Err(e) => {
            warn!("Field selection call failed: {}", e);
            update.confidence = Some(0.0);
            update.fail(TurnError::from(&e));
            return update;
        }
    };

    let (parsed, path) = match decode_strict::<FieldReply>(&reply.content) {
        Ok(r) => (r, DecodePath::Structured),
        Err(e) => {
            warn!("Field selection reply not parseable: {}", e);
            let fallback = FieldReply {
                reasoning: Some(format!("Could not read the field selection reply: {}", e)),
                ..Default::default()
            };
            (fallback, DecodePath::Heuristic)
        }
    };
    let choice = validate_fields(explore, parsed);
    let confidence = state.confidence.min(choice.confidence);

    info!(
        "Fields: {} dimensions, {} measures ({})",
        choice.selection.dimensions.len(),
        choice.selection.measures.len(),
        percent(confidence)
    );
    update.trace(format!(
        "📋 Selected {} dimensions, {} measures via {}",
        choice.selection.dimensions.len(),
        choice.selection.measures.len(),
        path
    ));
    for (term, field) in &choice.field_mapping {
        update.trace(format!("   '{}' → {}", term, field));
    }
    for name in &choice.moved {
        update.trace(format!("   Moved {} to its correct field list", name));
    }
    if !choice.dropped.is_empty() {
        update.trace(format!(
            "⚠️ Dropped unknown fields: {}",
            choice.dropped.join(", ")
        ));
        update.recover(ErrorKind::FieldHallucinationDetected);
    }
    if !choice.uncertain_terms.is_empty() {
        update.trace(format!("   Uncertain terms: {}", choice.uncertain_terms.join(", ")));
    }
    if !choice.reasoning.is_empty() {
        update.trace(format!("   Reasoning: {}", choice.reasoning));
    }

    // Questions raised during model selection stay ahead of ours.
    let mut questions = state.clarifying_questions.clone().unwrap_or_default();
    for question in choice.clarifying_questions {
        if !questions.contains(&question) {
            questions.push(question);
        }
    }
    update.needs_clarification = Some(!questions.is_empty());
    if !questions.is_empty() {
        update.clarifying_questions = Some(questions);
    }
    update.field_selection = Some(choice.selection);
    update.confidence = Some(confidence);
    update
}

//! Model / explore selection.
//!
//! The reasoning delegate proposes a `(model, explore)` pair; the pair is only
//! accepted when it names an explore present in the discovered schema.

use crate::error::{ErrorKind, TurnError};
use crate::llm::{clamp_confidence, decode_strict, DecodePath, Reasoner};
use crate::nodes::{percent, selector_context, NodeContext, NO_EXPLORES_MESSAGE};
use crate::prompts;
use crate::schema::{ExploreDetail, ProjectSchema};
use crate::state::{FieldSelection, Intent, StateUpdate, TurnState};
use crate::tools::{tools_for_intent, MATERIALIZE_QUERY};
use itertools::Itertools;
use serde::Deserialize;
use tracing::{info, warn};

const SAMPLED_FIELDS: usize = 10;

#[derive(Debug, Default, Deserialize)]
struct ModelReply {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    explore: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    clarifying_questions: Vec<String>,
}

/// Outcome of model selection. `model`/`explore` are set only when they name
/// an explore in the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelChoice {
    pub model: Option<String>,
    pub explore: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub clarifying_questions: Vec<String>,
    pub path: DecodePath,
}

impl ModelChoice {
    pub fn is_resolved(&self) -> bool {
        self.model.is_some() && self.explore.is_some()
    }

    fn unresolved(reasoning: String, question: String, path: DecodePath) -> Self {
        Self {
            model: None,
            explore: None,
            confidence: 0.0,
            reasoning,
            clarifying_questions: vec![question],
            path,
        }
    }
}

/// Compact listing of every explore with a sample of its field names.
pub fn summarize_schema(schema: &ProjectSchema) -> String {
    let mut out = String::new();
    for model in &schema.models {
        out.push_str(&format!("\nModel: {}", model.name));
        if !model.label.is_empty() && model.label != model.name {
            out.push_str(&format!(" ({})", model.label));
        }
        out.push('\n');
        for summary in &model.explores {
            out.push_str(&format!("  Explore: {}", summary.name));
            if !summary.description.is_empty() {
                out.push_str(&format!(" - {}", summary.description));
            }
            out.push('\n');
            if let Some(detail) = schema.explore(&model.name, &summary.name) {
                out.push_str(&format!(
                    "    Dimensions: {}\n",
                    sample_names(detail.dimensions.iter().map(|f| f.name.as_str()))
                ));
                out.push_str(&format!(
                    "    Measures: {}\n",
                    sample_names(detail.measures.iter().map(|f| f.name.as_str()))
                ));
            }
        }
    }
    out
}

fn sample_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let names: Vec<&str> = names.collect();
    let shown = names.iter().take(SAMPLED_FIELDS).join(", ");
    if names.len() > SAMPLED_FIELDS {
        format!("{}, ... ({} total)", shown, names.len())
    } else if shown.is_empty() {
        "(none)".to_string()
    } else {
        shown
    }
}

/// Find the explore a reply names. Exact first, then case-insensitive.
fn lookup<'a>(schema: &'a ProjectSchema, model: &str, explore: &str) -> Option<&'a ExploreDetail> {
    schema.explore(model, explore).or_else(|| {
        schema.explores.values().find(|e| {
            e.model.eq_ignore_ascii_case(model.trim()) && e.name.eq_ignore_ascii_case(explore.trim())
        })
    })
}

fn explore_choices(schema: &ProjectSchema) -> String {
    schema.explores.keys().take(8).join(", ")
}

/// Validate a reply against the schema.
pub fn resolve_choice(schema: &ProjectSchema, content: &str) -> ModelChoice {
    let reply: ModelReply = match decode_strict(content) {
        Ok(r) => r,
        Err(e) => {
            return ModelChoice::unresolved(
                format!("Could not read the selection reply: {}", e),
                format!(
                    "Which dataset should I use to answer this? Available explores: {}",
                    explore_choices(schema)
                ),
                DecodePath::Heuristic,
            )
        }
    };

    let reasoning = reply.reasoning.unwrap_or_default();
    let (model, explore) = match (reply.model, reply.explore) {
        (Some(m), Some(e)) if !m.trim().is_empty() && !e.trim().is_empty() => (m, e),
        _ => {
            let mut questions: Vec<String> = reply
                .clarifying_questions
                .into_iter()
                .filter(|q| !q.trim().is_empty())
                .collect();
            if questions.is_empty() {
                questions.push(format!(
                    "Which dataset should I use to answer this? Available explores: {}",
                    explore_choices(schema)
                ));
            }
            return ModelChoice {
                model: None,
                explore: None,
                confidence: 0.0,
                reasoning,
                clarifying_questions: questions,
                path: DecodePath::Structured,
            };
        }
    };

    match lookup(schema, &model, &explore) {
        Some(detail) => ModelChoice {
            model: Some(detail.model.clone()),
            explore: Some(detail.name.clone()),
            confidence: clamp_confidence(reply.confidence.unwrap_or(0.0)),
            reasoning,
            clarifying_questions: reply.clarifying_questions,
            path: DecodePath::Structured,
        },
        None => ModelChoice::unresolved(
            format!("'{}.{}' is not in the discovered schema", model, explore),
            format!(
                "I couldn't find explore '{}' in model '{}'. Did you mean one of: {}?",
                explore,
                model,
                explore_choices(schema)
            ),
            DecodePath::Structured,
        ),
    }
}

pub(crate) fn selection_tools(intent: Intent) -> Vec<&'static str> {
    tools_for_intent(intent)
        .into_iter()
        .filter(|t| *t != MATERIALIZE_QUERY)
        .collect()
}

pub async fn select_model(state: &TurnState, ctx: &NodeContext) -> StateUpdate {
    let mut update = StateUpdate::new();
    let schema = match state.schema() {
        Some(s) => s,
        None => {
            update.fail(TurnError::new(ErrorKind::ExternalCallError, "No schema available for model selection"));
            return update;
        }
    };
    if schema.is_empty() {
        update.trace("⚠️ No explores are available to select from");
        update.recover(ErrorKind::ModelSelectionAmbiguous);
        update.confidence = Some(0.0);
        update.needs_clarification = Some(true);
        update.clarifying_questions = Some(vec![NO_EXPLORES_MESSAGE.to_string()]);
        return update;
    }
    let intent = state.intent.unwrap_or(Intent::Query);

    let context = selector_context(state, ctx.context.model_messages, ctx.context.max_chars);
    let prompt = prompts::model_selection(&summarize_schema(schema), state.query_text(), &context);
    let reply = match ctx.reasoner.reason(&prompt, &selection_tools(intent)).await {
        Ok(r) => r,
        Err(e) => {
            warn!("Model selection call failed: {}", e);
            update.confidence = Some(0.0);
            update.fail(TurnError::from(&e));
            return update;
        }
    };

    let choice = resolve_choice(schema, &reply.content);
    match (&choice.model, &choice.explore) {
        (Some(model), Some(explore)) => {
            info!("Selected {}.{} ({})", model, explore, percent(choice.confidence));
            update.trace(format!(
                "📊 Selected model: {}, explore: {} (confidence: {})",
                model,
                explore,
                percent(choice.confidence)
            ));
            if !choice.reasoning.is_empty() {
                update.trace(format!("   Reasoning: {}", choice.reasoning));
            }
            update.field_selection = Some(FieldSelection::for_explore(model, explore));
            update.confidence = Some(choice.confidence);
            let questions: Vec<String> = choice
                .clarifying_questions
                .iter()
                .filter(|q| !q.trim().is_empty())
                .cloned()
                .collect();
            update.needs_clarification = Some(!questions.is_empty());
            if !questions.is_empty() {
                update.trace(format!("   Model selector asked {} question(s)", questions.len()));
                update.clarifying_questions = Some(questions);
            }
        }
        _ => {
            update.trace(format!("❓ Could not determine model/explore: {}", choice.reasoning));
            if choice.path == DecodePath::Heuristic {
                update.trace("   Selection reply was not valid JSON; asking for clarification");
            }
            update.recover(ErrorKind::ModelSelectionAmbiguous);
            update.confidence = Some(0.0);
            update.needs_clarification = Some(true);
            update.clarifying_questions = Some(choice.clarifying_questions);
        }
    }
    update
}

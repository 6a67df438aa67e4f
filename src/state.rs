//! Conversation Turn State
//!
//! The record threaded through the pipeline. Nodes read it immutably and
//! return a [`StateUpdate`]; [`TurnState::apply`] is the only place state
//! changes. List fields append, everything else overwrites when present.

use crate::error::{ErrorKind, TurnError};
use crate::schema::ProjectSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Fixed intent label set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Query,
    SchemaOverview,
    ExploreDetails,
    FieldExplain,
    FollowUp,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Query,
        Intent::SchemaOverview,
        Intent::ExploreDetails,
        Intent::FieldExplain,
        Intent::FollowUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Query => "query",
            Intent::SchemaOverview => "schema_overview",
            Intent::ExploreDetails => "explore_details",
            Intent::FieldExplain => "field_explain",
            Intent::FollowUp => "follow_up",
        }
    }

    pub fn parse(label: &str) -> Option<Intent> {
        let label = label.trim().to_lowercase();
        Intent::ALL.into_iter().find(|i| i.as_str() == label)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved set of fields used to materialize a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub model: String,
    pub explore: String,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl FieldSelection {
    /// Empty selection pinned to a model/explore pair.
    pub fn for_explore(model: &str, explore: &str) -> Self {
        Self {
            model: model.to_string(),
            explore: explore.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty() && self.measures.is_empty()
    }

    pub fn explore_key(&self) -> String {
        crate::schema::explore_key(&self.model, &self.explore)
    }

    /// Every field name the selection references, filters included.
    pub fn referenced_fields(&self) -> impl Iterator<Item = &String> {
        self.dimensions
            .iter()
            .chain(self.measures.iter())
            .chain(self.filters.keys())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Start,
    SchemaDiscovered,
    IntentClassified,
    ModelSelected,
    FieldsSelected,
    ConfidenceChecked,
    Clarifying,
    QueryReady,
    Explaining,
    Done,
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnPhase::Done | TurnPhase::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct TurnState {
    // Conversation history, kept across turns until cleared.
    pub messages: Vec<Message>,

    // Session-scoped
    pub project_schema: Option<Arc<ProjectSchema>>,
    pub schema_loaded: bool,
    pub previous_selection: Option<FieldSelection>,

    // Per-turn
    pub current_query: Option<String>,
    pub intent: Option<Intent>,
    pub field_selection: Option<FieldSelection>,
    pub confidence: f64,
    pub needs_clarification: bool,
    pub clarifying_questions: Option<Vec<String>>,
    pub generated_query: Option<String>,
    pub explanation_trace: Vec<String>,
    pub recovered: Vec<ErrorKind>,
    pub final_response: Option<String>,
    pub error: Option<TurnError>,
    pub phase: TurnPhase,
}

impl Default for TurnState {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnState {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            project_schema: None,
            schema_loaded: false,
            previous_selection: None,
            current_query: None,
            intent: None,
            field_selection: None,
            confidence: 0.0,
            needs_clarification: false,
            clarifying_questions: None,
            generated_query: None,
            explanation_trace: Vec::new(),
            recovered: Vec::new(),
            final_response: None,
            error: None,
            phase: TurnPhase::Start,
        }
    }

    /// Start a new turn from the previous one: per-turn fields are reset,
    /// history and session-scoped fields carry over.
    pub fn begin_turn(prior: &TurnState, utterance: &str) -> Self {
        let mut messages = prior.messages.clone();
        messages.push(Message::user(utterance));
        Self {
            messages,
            project_schema: prior.project_schema.clone(),
            schema_loaded: prior.schema_loaded,
            previous_selection: prior.previous_selection.clone(),
            current_query: Some(utterance.to_string()),
            ..Self::new()
        }
    }

    /// Fresh conversation that keeps the discovered schema.
    pub fn cleared(&self) -> Self {
        Self {
            project_schema: self.project_schema.clone(),
            schema_loaded: self.schema_loaded,
            ..Self::new()
        }
    }

    pub fn schema(&self) -> Option<&ProjectSchema> {
        self.project_schema.as_deref()
    }

    pub fn query_text(&self) -> &str {
        self.current_query.as_deref().unwrap_or("")
    }

    /// Reducer: lists append, present scalars overwrite.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        self.explanation_trace.extend(update.explanation_trace);
        self.recovered.extend(update.recovered);

        if let Some(schema) = update.project_schema {
            self.project_schema = Some(schema);
        }
        if let Some(loaded) = update.schema_loaded {
            self.schema_loaded = loaded;
        }
        if let Some(selection) = update.previous_selection {
            self.previous_selection = Some(selection);
        }
        if let Some(q) = update.current_query {
            self.current_query = Some(q);
        }
        if let Some(intent) = update.intent {
            self.intent = Some(intent);
        }
        if let Some(selection) = update.field_selection {
            self.field_selection = Some(selection);
        }
        if let Some(confidence) = update.confidence {
            self.confidence = confidence.clamp(0.0, 1.0);
        }
        if let Some(flag) = update.needs_clarification {
            self.needs_clarification = flag;
        }
        if let Some(questions) = update.clarifying_questions {
            self.clarifying_questions = Some(questions);
        }
        if let Some(query) = update.generated_query {
            self.generated_query = Some(query);
        }
        if let Some(response) = update.final_response {
            self.final_response = Some(response);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
    }

    /// Recent conversation lines for selector prompts, excluding the
    /// utterance currently being processed.
    pub fn recent_context(&self, max_messages: usize, max_chars: usize) -> String {
        let history = match self.messages.last() {
            Some(last) if last.role == Role::User => &self.messages[..self.messages.len() - 1],
            _ => &self.messages[..],
        };
        let start = history.len().saturating_sub(max_messages);
        history[start..]
            .iter()
            .filter(|m| m.role != Role::Tool)
            .map(|m| {
                let who = match m.role {
                    Role::User => "User",
                    _ => "Assistant",
                };
                let content: String = m.content.chars().take(max_chars).collect();
                format!("{}: {}", who, content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Partial update returned by a node
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub explanation_trace: Vec<String>,
    pub recovered: Vec<ErrorKind>,
    pub project_schema: Option<Arc<ProjectSchema>>,
    pub schema_loaded: Option<bool>,
    pub previous_selection: Option<FieldSelection>,
    pub current_query: Option<String>,
    pub intent: Option<Intent>,
    pub field_selection: Option<FieldSelection>,
    pub confidence: Option<f64>,
    pub needs_clarification: Option<bool>,
    pub clarifying_questions: Option<Vec<String>>,
    pub generated_query: Option<String>,
    pub final_response: Option<String>,
    pub error: Option<TurnError>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&mut self, line: impl Into<String>) {
        self.explanation_trace.push(line.into());
    }

    pub fn recover(&mut self, kind: ErrorKind) {
        self.recovered.push(kind);
    }

    pub fn fail(&mut self, error: TurnError) {
        self.trace(format!("❌ {}", error.message));
        self.error = Some(error);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Schema discovery failed: {0}")]
    SchemaDiscovery(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Iteration limit exceeded after {0} steps")]
    IterationLimit(usize),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Failure taxonomy as seen by the orchestrator.
///
/// Only `SchemaDiscoveryFailed` (with nothing cached) and `Cancelled` end a
/// turn without a response; every other kind is absorbed into a user-facing
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaDiscoveryFailed,
    PartialSchema,
    ClassificationParseFailed,
    ModelSelectionAmbiguous,
    FieldHallucinationDetected,
    ExternalCallError,
    IterationLimitExceeded,
    Cancelled,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::SchemaDiscoveryFailed | ErrorKind::Cancelled)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::SchemaDiscoveryFailed => "schema_discovery_failed",
            ErrorKind::PartialSchema => "partial_schema",
            ErrorKind::ClassificationParseFailed => "classification_parse_failed",
            ErrorKind::ModelSelectionAmbiguous => "model_selection_ambiguous",
            ErrorKind::FieldHallucinationDetected => "field_hallucination_detected",
            ErrorKind::ExternalCallError => "external_call_error",
            ErrorKind::IterationLimitExceeded => "iteration_limit_exceeded",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::SchemaDiscovery(_) => ErrorKind::SchemaDiscoveryFailed,
            AgentError::Decode(_) => ErrorKind::ClassificationParseFailed,
            AgentError::IterationLimit(_) => ErrorKind::IterationLimitExceeded,
            AgentError::Cancelled => ErrorKind::Cancelled,
            AgentError::Tool(_)
            | AgentError::Llm(_)
            | AgentError::Config(_)
            | AgentError::Io(_)
            | AgentError::Json(_)
            | AgentError::Http(_) => ErrorKind::ExternalCallError,
        }
    }
}

/// Error recorded on the turn state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TurnError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&AgentError> for TurnError {
    fn from(e: &AgentError) -> Self {
        TurnError::new(e.kind(), e.to_string())
    }
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod nodes;
pub mod prompts;
pub mod schema;
pub mod session;
pub mod state;
pub mod tools;

pub use config::AgentConfig;
pub use error::{AgentError, ErrorKind, Result, TurnError};
pub use graph::{Orchestrator, TurnOutcome};
pub use session::ChatSession;
pub use state::{FieldSelection, Intent, TurnPhase, TurnState};

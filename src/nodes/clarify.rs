use crate::state::{StateUpdate, TurnState};

pub const GENERIC_QUESTION: &str = "Could you provide more details about what you're looking for?";
const INTRO: &str = "I want to make sure I understand your question correctly.";

/// Render clarifying questions as one user-facing message. Always ends up
/// containing at least one question.
pub fn format_clarification(questions: &[String]) -> String {
    let questions: Vec<String> = questions
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .map(|q| {
            if q.ends_with('?') {
                q.to_string()
            } else {
                format!("{}?", q)
            }
        })
        .collect();

    match questions.as_slice() {
        [] => format!("{} {}", INTRO, GENERIC_QUESTION),
        [only] => format!("{} {}", INTRO, only),
        many => {
            let numbered = many
                .iter()
                .enumerate()
                .map(|(i, q)| format!("{}. {}", i + 1, q))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{} I have a few questions:\n\n{}", INTRO, numbered)
        }
    }
}

pub fn ask_clarify(state: &TurnState) -> StateUpdate {
    let mut update = StateUpdate::new();
    let questions = state.clarifying_questions.clone().unwrap_or_default();
    update.trace(format!(
        "❓ Asking {} clarifying question(s)",
        questions.len().max(1)
    ));
    update.final_response = Some(format_clarification(&questions));
    update
}

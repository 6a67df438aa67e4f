//! Explain a single dimension or measure.

use crate::nodes::NO_EXPLORES_MESSAGE;
use crate::schema::{Field, FieldKind, ProjectSchema};
use crate::state::{StateUpdate, TurnState};

const QUESTION_PATTERNS: &[&str] = &[
    "what is ",
    "what's ",
    "explain ",
    "tell me about ",
    "what does ",
    " mean",
    "?",
];
const STOP_WORDS: &[&str] = &["the", "a", "an", "field", "dimension", "measure", "is", "are"];
const MAX_SUGGESTIONS: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch<'a> {
    pub field: &'a Field,
    pub kind: FieldKind,
    pub model: &'a str,
    pub explore: &'a str,
}

/// Strip question phrasing and stop words, leaving the term asked about.
pub fn extract_field_term(query: &str) -> String {
    let mut text = format!(" {} ", query.to_lowercase());
    for pattern in QUESTION_PATTERNS {
        text = text.replace(pattern, " ");
    }
    text.split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// First field whose name contains the normalized term, scanning explores
/// in key order, dimensions before measures.
pub fn find_field<'a>(schema: &'a ProjectSchema, term: &str) -> Option<FieldMatch<'a>> {
    let needle = term.trim().to_lowercase().replace(' ', "_");
    if needle.is_empty() {
        return None;
    }
    schema.explores.values().find_map(|explore| {
        explore
            .fields()
            .find(|(f, _)| f.name.to_lowercase().contains(&needle))
            .map(|(field, kind)| FieldMatch {
                field,
                kind,
                model: &explore.model,
                explore: &explore.name,
            })
    })
}

pub fn format_field_explanation(m: &FieldMatch<'_>) -> String {
    let field = m.field;
    let is_measure = m.kind == FieldKind::Measure;
    let (icon, heading) = if is_measure {
        ("📏", "MEASURE")
    } else {
        ("📐", "DIMENSION")
    };
    let description = field
        .description
        .as_deref()
        .filter(|d| !d.is_empty())
        .unwrap_or("No description available");

    let mut lines = vec![
        format!("{} **{}: {}**", icon, heading, field.name),
        String::new(),
        format!("┌{}┐", "─".repeat(50)),
        format!("│ **Label:** {}", field.display_label()),
        format!("│ **Type:** {}", field.field_type),
        format!("│ **Explore:** {}", m.explore),
        format!("│ **Model:** {}", m.model),
        format!("└{}┘", "─".repeat(50)),
        String::new(),
        "**📝 Description:**".to_string(),
        format!("  {}", description),
        String::new(),
    ];

    if let Some(sql) = field.sql.as_deref().filter(|s| !s.is_empty()) {
        lines.push("**💻 SQL Definition:**".to_string());
        lines.push("  ```sql".to_string());
        lines.push(format!("  {}", sql));
        lines.push("  ```".to_string());
        lines.push(String::new());
    }

    lines.push("**💡 Usage:**".to_string());
    if is_measure {
        lines.push(format!(
            "  This is an aggregation ({}). Use it to calculate totals, averages, etc.",
            field.field_type
        ));
        lines.push(format!("  Example: \"Show me {} by region\"", field.name));
    } else {
        lines.push("  This is a dimension used for grouping data.".to_string());
        lines.push(format!("  Example: \"Show me sales by {}\"", field.name));
    }
    lines.join("\n")
}

/// Closest field names to `term` by Jaro-Winkler similarity.
pub fn suggest_fields(schema: &ProjectSchema, term: &str, limit: usize) -> Vec<String> {
    let needle = term.trim().to_lowercase().replace(' ', "_");
    let mut scored: Vec<(f64, &str)> = schema
        .explores
        .values()
        .flat_map(|e| e.fields())
        .map(|(f, _)| {
            let name = f.name.to_lowercase();
            let short = name.rsplit('.').next().unwrap_or(name.as_str()).to_string();
            let score = strsim::jaro_winkler(&needle, &name).max(strsim::jaro_winkler(&needle, &short));
            (score, f.name.as_str())
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    let mut out: Vec<String> = Vec::new();
    for (_, name) in scored {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
        if out.len() == limit {
            break;
        }
    }
    out
}

pub fn format_field_not_found(term: &str, schema: &ProjectSchema) -> String {
    let mut lines = vec![
        format!("❌ **Field not found:** {}", term),
        String::new(),
        "I couldn't find a field matching that name.".to_string(),
    ];
    let suggestions = suggest_fields(schema, term, MAX_SUGGESTIONS);
    if !suggestions.is_empty() {
        lines.push(String::new());
        lines.push("**💡 Did you mean one of these?**".to_string());
        for name in suggestions {
            lines.push(format!("  • {}", name));
        }
    }
    lines.push(String::new());
    lines.push("Or ask \"What data is available?\" to see the full schema.".to_string());
    lines.join("\n")
}

pub fn field_explain(state: &TurnState) -> StateUpdate {
    let mut update = StateUpdate::new();
    let schema = match state.schema() {
        Some(s) => s,
        None => {
            update.final_response = Some(
                "I couldn't load the schema yet. Could you try again in a moment?".to_string(),
            );
            return update;
        }
    };

    if schema.is_empty() {
        update.trace("⚠️ No explores are loaded");
        update.final_response = Some(NO_EXPLORES_MESSAGE.to_string());
        return update;
    }

    update.trace("📖 Looking up field information");
    let term = extract_field_term(state.query_text());
    let response = match find_field(schema, &term) {
        Some(m) => {
            update.trace(format!("✅ Found {}: {} in {}.{}", m.kind.as_str(), m.field.name, m.model, m.explore));
            format_field_explanation(&m)
        }
        None => {
            update.trace(format!("❌ Field not found: {}", term));
            format_field_not_found(&term, schema)
        }
    };
    update.final_response = Some(response);
    update
}

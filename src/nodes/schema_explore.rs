//! Schema overview and per-explore detail rendering.

use crate::nodes::NO_EXPLORES_MESSAGE;
use crate::schema::{ExploreDetail, Field, ProjectSchema};
use crate::state::{Intent, StateUpdate, TurnState};

const MAX_FIELDS_SHOWN: usize = 15;
const RULE_WIDTH: usize = 50;

pub fn format_schema_tree(schema: &ProjectSchema) -> String {
    let mut lines = vec!["📁 **AVAILABLE DATA**".to_string(), String::new()];

    for model in &schema.models {
        lines.push(format!("├── 📊 **Model: {}**", model.name));
        if !model.label.is_empty() && model.label != model.name {
            lines.push(format!("│   ({})", model.label));
        }
        let last = model.explores.len().saturating_sub(1);
        for (i, explore) in model.explores.iter().enumerate() {
            let branch = if i == last { "└──" } else { "├──" };
            lines.push(format!("│       {} 🔍 **{}**", branch, explore.name));
            if !explore.description.is_empty() {
                lines.push(format!("│           {}", truncate(&explore.description, 60)));
            }
            lines.push(format!(
                "│           📐 {} dimensions | 📏 {} measures",
                explore.dimension_count, explore.measure_count
            ));
        }
        lines.push("│".to_string());
    }

    lines.push(String::new());
    lines.push("💡 **Try asking:**".to_string());
    lines.push("  • \"Tell me about the [explore_name] explore\"".to_string());
    lines.push("  • \"What dimensions are in [explore_name]?\"".to_string());
    lines.push("  • \"Show me sales by region\" (to generate a query)".to_string());
    lines.join("\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}

fn push_fields(lines: &mut Vec<String>, fields: &[Field]) {
    for field in fields.iter().take(MAX_FIELDS_SHOWN) {
        let mut line = format!("  • {}", field.name);
        if !field.field_type.is_empty() {
            line.push_str(&format!(" [{}]", field.field_type));
        }
        lines.push(line);
        if let Some(desc) = field.description.as_deref().filter(|d| !d.is_empty()) {
            lines.push(format!("    {}", truncate(desc, 60)));
        }
    }
    if fields.len() > MAX_FIELDS_SHOWN {
        lines.push(format!("  ... and {} more", fields.len() - MAX_FIELDS_SHOWN));
    }
}

pub fn format_explore_details(explore: &ExploreDetail) -> String {
    let rule = "═".repeat(RULE_WIDTH);
    let mut lines = vec![
        format!("🔍 **EXPLORE: {}**", explore.name),
        format!("   Model: {}", explore.model),
    ];
    if !explore.description.is_empty() {
        lines.push(format!("   {}", explore.description));
    }

    lines.push(String::new());
    lines.push(rule.clone());
    lines.push("📐 **DIMENSIONS**".to_string());
    lines.push(rule.clone());
    push_fields(&mut lines, &explore.dimensions);

    lines.push(String::new());
    lines.push(rule.clone());
    lines.push("📏 **MEASURES**".to_string());
    lines.push(rule);
    push_fields(&mut lines, &explore.measures);

    if let (Some(dim), Some(measure)) = (explore.dimensions.first(), explore.measures.first()) {
        lines.push(String::new());
        lines.push("💡 **Example query:**".to_string());
        lines.push(format!("  • \"Show me {} by {}\"", measure.name, dim.name));
    }
    lines.join("\n")
}

/// Find the explore a question refers to. The longest explore name found in
/// the text wins (underscores may be written as spaces); failing that, the
/// first explore of a mentioned model.
pub fn extract_explore<'a>(query: &str, schema: &'a ProjectSchema) -> Option<&'a ExploreDetail> {
    let text = query.to_lowercase();
    let mentions = |name: &str| {
        let name = name.to_lowercase();
        !name.is_empty() && (text.contains(&name) || text.contains(&name.replace('_', " ")))
    };

    let by_explore = schema
        .explores
        .values()
        .filter(|e| mentions(e.name.as_str()))
        .max_by_key(|e| e.name.len());
    if by_explore.is_some() {
        return by_explore;
    }

    schema
        .models
        .iter()
        .filter(|m| mentions(m.name.as_str()))
        .max_by_key(|m| m.name.len())
        .and_then(|m| m.explores.first().and_then(|e| schema.explore(&m.name, &e.name)))
}

pub fn schema_explore(state: &TurnState) -> StateUpdate {
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

    let response = match state.intent {
        Some(Intent::ExploreDetails) => match extract_explore(state.query_text(), schema) {
            Some(explore) => {
                update.trace(format!("🔍 Showing details for: {}", explore.key()));
                format_explore_details(explore)
            }
            None => {
                update.trace("📁 Showing schema (couldn't identify a specific explore)");
                format!(
                    "{}\n\n💡 Tip: Ask about a specific explore, e.g. 'Tell me about the orders explore'",
                    format_schema_tree(schema)
                )
            }
        },
        _ => {
            update.trace("📁 Showing schema overview");
            format_schema_tree(schema)
        }
    };
    update.final_response = Some(response);
    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::{explore, schema};

    fn fixture() -> ProjectSchema {
        schema(vec![
            explore("sales", "orders", &["orders.region"], &["orders.total_sales"]),
            explore("sales", "order_items", &["order_items.sku"], &["order_items.count"]),
            explore("finance", "ledger", &["ledger.account"], &["ledger.balance"]),
        ])
    }

    #[test]
    fn test_longest_explore_name_wins() {
        let s = fixture();
        assert_eq!(extract_explore("tell me about order_items", &s).map(|e| e.name.as_str()), Some("order_items"));
        assert_eq!(extract_explore("what's in order items?", &s).map(|e| e.name.as_str()), Some("order_items"));
        assert_eq!(extract_explore("Tell me about the orders explore", &s).map(|e| e.name.as_str()), Some("orders"));
    }

    #[test]
    fn test_model_name_falls_back_to_first_explore() {
        let s = fixture();
        assert_eq!(extract_explore("what is in finance", &s).map(|e| e.name.as_str()), Some("ledger"));
        assert!(extract_explore("show me everything", &s).is_none());
    }

    #[test]
    fn test_details_have_sections_and_truncate() {
        let dims: Vec<String> = (0..20).map(|i| format!("orders.d{}", i)).collect();
        let dim_refs: Vec<&str> = dims.iter().map(String::as_str).collect();
        let e = explore("sales", "orders", &dim_refs, &["orders.count"]);
        let text = format_explore_details(&e);
        assert!(text.contains("DIMENSIONS"));
        assert!(text.contains("MEASURES"));
        assert!(text.contains("... and 5 more"));
    }

    #[test]
    fn test_tree_lists_every_explore() {
        let text = format_schema_tree(&fixture());
        for name in ["orders", "order_items", "ledger"] {
            assert!(text.contains(&format!("**{}**", name)));
        }
    }
}

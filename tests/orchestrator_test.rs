mod common;

use common::*;
use sl_agent::llm::ScriptedReasoner;
use sl_agent::prompts::{CLASSIFIER_ROLE, FIELD_SELECTOR_ROLE, MODEL_SELECTOR_ROLE};
use sl_agent::{ErrorKind, Intent, TurnPhase};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const FIELDS_OK: &str = r#"```json
{
  "dimensions": ["orders.region"],
  "measures": ["orders.total_sales"],
  "filters": {},
  "confidence": 0.9,
  "field_mapping": {"sales": "orders.total_sales", "region": "orders.region"},
  "reasoning": "sales maps to total_sales",
  "uncertain_terms": [],
  "clarifying_questions": []
}
```"#;

fn query_reasoner(fields_reply: &str) -> Arc<ScriptedReasoner> {
    Arc::new(
        ScriptedReasoner::new()
            .on(CLASSIFIER_ROLE, &classify_reply("query", 0.95))
            .on(MODEL_SELECTOR_ROLE, &model_reply("ecommerce", "orders", 0.92))
            .on(FIELD_SELECTOR_ROLE, fields_reply),
    )
}

#[tokio::test]
async fn test_schema_overview_through_fallback() {
    let layer = Arc::new(TestLayer::new());
    // Empty replies everywhere: classification must fall back to keywords.
    let mut session = session(Arc::clone(&layer), Arc::new(ScriptedReasoner::new()));

    let outcome = session.chat("What data is available?").await;
    let state = &outcome.state;

    assert_eq!(state.phase, TurnPhase::Done);
    assert_eq!(state.intent, Some(Intent::SchemaOverview));
    assert!(state.confidence > 0.0);
    assert!(state.schema_loaded);
    assert!(state.recovered.contains(&ErrorKind::ClassificationParseFailed));
    assert!(outcome.explanation_trace.iter().any(|l| l.contains("heuristic fallback")));

    let response = outcome.final_response.unwrap();
    assert!(response.contains("AVAILABLE DATA"));
    assert!(response.contains("orders"));
    assert!(response.contains("ledger"));
}

#[tokio::test]
async fn test_discovery_is_cached_across_turns() {
    let layer = Arc::new(TestLayer::new());
    let mut session = session(Arc::clone(&layer), Arc::new(ScriptedReasoner::new()));

    session.chat("What data is available?").await;
    let outcome = session.chat("What explores are there?").await;

    assert_eq!(layer.list_models_count(), 1);
    assert_eq!(outcome.state.schema().map(|s| s.explore_count()), Some(3));
}

#[tokio::test]
async fn test_query_happy_path_is_materialized_once() {
    let layer = Arc::new(TestLayer::new().with_stub_query(STUB_QUERY));
    let mut session = session(Arc::clone(&layer), query_reasoner(FIELDS_OK));

    let outcome = session.chat("Show me total sales by region").await;
    let state = &outcome.state;

    assert_eq!(state.phase, TurnPhase::Done);
    assert_eq!(layer.materialize_count(), 1);
    assert_eq!(state.generated_query.as_deref(), Some(STUB_QUERY));
    assert!((state.confidence - 0.9).abs() < 1e-9);

    let response = outcome.final_response.unwrap();
    assert!(response.contains(STUB_QUERY));
    assert!(response.contains("ecommerce.orders"));
    assert!(outcome.explanation_trace.iter().any(|l| l.contains("'sales' → orders.total_sales")));
    assert!(outcome
        .explanation_trace
        .iter()
        .any(|l| l.contains("Intent: query") && l.contains("via structured JSON")));
    assert!(outcome
        .explanation_trace
        .iter()
        .any(|l| l.contains("measures via structured JSON")));
    assert!(!outcome.explanation_trace.iter().any(|l| l.contains("heuristic fallback")));

    let previous = state.previous_selection.as_ref().unwrap();
    assert_eq!(previous.measures, vec!["orders.total_sales"]);

    // same state renders the same response
    let again = sl_agent::nodes::format_response::format_query_response(previous, STUB_QUERY);
    assert_eq!(again, response);
}

#[tokio::test]
async fn test_invented_fields_are_filtered_and_clarified() {
    let fields = r#"{
        "dimensions": ["orders.region", "orders.planet"],
        "measures": ["orders.profit_margin"],
        "confidence": 0.97
    }"#;
    let layer = Arc::new(TestLayer::new().with_stub_query(STUB_QUERY));
    let mut session = session(Arc::clone(&layer), query_reasoner(fields));

    let outcome = session.chat("Show me profit margin by planet").await;
    let state = &outcome.state;

    assert_eq!(layer.materialize_count(), 0);
    assert!(state.confidence <= 0.3);
    assert!(state.recovered.contains(&ErrorKind::FieldHallucinationDetected));

    let selection = state.field_selection.as_ref().unwrap();
    assert_eq!(selection.dimensions, vec!["orders.region"]);
    assert!(selection.measures.is_empty());

    let response = outcome.final_response.unwrap();
    assert!(response.contains('?'));
    assert!(response.contains("orders.profit_margin"));
}

#[tokio::test]
async fn test_low_confidence_asks_instead_of_materializing() {
    let fields = r#"{"dimensions": ["orders.region"], "measures": ["orders.total_sales"], "confidence": 0.5}"#;
    let layer = Arc::new(TestLayer::new().with_stub_query(STUB_QUERY));
    let mut session = session(Arc::clone(&layer), query_reasoner(fields));

    let outcome = session.chat("sales-ish things by area").await;

    assert_eq!(layer.materialize_count(), 0);
    assert_eq!(outcome.state.phase, TurnPhase::Done);
    assert!(outcome.state.generated_query.is_none());
    assert!(outcome.final_response.unwrap().contains('?'));
}

#[tokio::test]
async fn test_unknown_explore_forces_clarification() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .on(CLASSIFIER_ROLE, &classify_reply("query", 0.9))
            .on(MODEL_SELECTOR_ROLE, &model_reply("ecommerce", "invoices", 0.99))
            .on(FIELD_SELECTOR_ROLE, FIELDS_OK),
    );
    let layer = Arc::new(TestLayer::new().with_stub_query(STUB_QUERY));
    let mut session = session(Arc::clone(&layer), reasoner);

    let outcome = session.chat("Show me invoice totals").await;

    assert_eq!(layer.materialize_count(), 0);
    assert!(outcome.state.recovered.contains(&ErrorKind::ModelSelectionAmbiguous));
    assert_eq!(outcome.state.confidence, 0.0);
    let response = outcome.final_response.unwrap();
    assert!(response.contains("invoices"));
    assert!(response.contains('?'));
}

#[tokio::test]
async fn test_model_selector_questions_reach_the_user() {
    let model = r#"{"model": "ecommerce", "explore": "orders", "confidence": 0.5,
        "clarifying_questions": ["Do you mean gross or net sales?"]}"#;
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .on(CLASSIFIER_ROLE, &classify_reply("query", 0.95))
            .on(MODEL_SELECTOR_ROLE, model)
            .on(FIELD_SELECTOR_ROLE, FIELDS_OK),
    );
    let layer = Arc::new(TestLayer::new().with_stub_query(STUB_QUERY));
    let mut session = session(Arc::clone(&layer), reasoner);

    let outcome = session.chat("Show me sales by region").await;

    assert_eq!(layer.materialize_count(), 0);
    assert!(outcome.state.needs_clarification);
    assert_eq!(
        outcome.state.clarifying_questions.as_deref().and_then(|q| q.first()).map(String::as_str),
        Some("Do you mean gross or net sales?")
    );
    assert!(outcome.final_response.unwrap().contains("gross or net sales"));
}

#[tokio::test]
async fn test_explore_details() {
    let reasoner = Arc::new(ScriptedReasoner::new().on(CLASSIFIER_ROLE, &classify_reply("explore_details", 0.93)));
    let mut session = session(Arc::new(TestLayer::new()), reasoner);

    let outcome = session.chat("Tell me about the orders explore").await;

    assert_eq!(outcome.state.intent, Some(Intent::ExploreDetails));
    let response = outcome.final_response.unwrap();
    assert!(response.contains("EXPLORE: orders"));
    assert!(response.contains("DIMENSIONS"));
    assert!(response.contains("MEASURES"));
    assert!(response.contains("orders.total_sales"));
}

#[tokio::test]
async fn test_field_explain() {
    let reasoner = Arc::new(ScriptedReasoner::new().on(CLASSIFIER_ROLE, &classify_reply("field_explain", 0.9)));
    let mut session = session(Arc::new(TestLayer::new()), reasoner);

    let outcome = session.chat("What is gross_margin?").await;
    let response = outcome.final_response.unwrap();
    assert!(response.contains("MEASURE: order_items.gross_margin"));
    assert!(response.contains("Revenue minus cost of goods"));

    let outcome = session.chat("What is shipping_zone?").await;
    let response = outcome.final_response.unwrap();
    assert!(response.contains("Field not found"));
}

#[tokio::test]
async fn test_partial_discovery_keeps_session_usable() {
    let layer = Arc::new(TestLayer::new().failing_explores_for("finance"));
    let mut session = session(Arc::clone(&layer), Arc::new(ScriptedReasoner::new()));

    let outcome = session.chat("What data is available?").await;
    let state = &outcome.state;

    assert!(state.schema_loaded);
    assert_eq!(state.phase, TurnPhase::Done);
    assert_eq!(state.schema().map(|s| s.explore_count()), Some(2));
    assert!(state.schema().unwrap().model("finance").is_none());
    assert!(state.recovered.contains(&ErrorKind::PartialSchema));
    assert!(outcome.explanation_trace.iter().any(|l| l.contains("finance")));
    assert!(!outcome.final_response.unwrap().contains("ledger"));
}

#[tokio::test]
async fn test_failed_explore_fields_are_omitted() {
    let layer = Arc::new(TestLayer::new().failing_fields_for("ecommerce", "order_items"));
    let mut session = session(Arc::clone(&layer), Arc::new(ScriptedReasoner::new()));

    let outcome = session.chat("What data is available?").await;
    let schema = outcome.state.schema().unwrap();
    assert_eq!(schema.explore_count(), 2);
    assert!(schema.explore("ecommerce", "order_items").is_none());
    assert!(outcome
        .explanation_trace
        .iter()
        .any(|l| l.contains("ecommerce.order_items")));
}

#[tokio::test]
async fn test_every_explore_failing_still_answers() {
    let layer = Arc::new(
        TestLayer::new()
            .failing_explores_for("ecommerce")
            .failing_explores_for("finance")
            .with_stub_query(STUB_QUERY),
    );
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .on("## User Message\nWhat data is available?", &classify_reply("schema_overview", 0.9))
            .on(CLASSIFIER_ROLE, &classify_reply("query", 0.95))
            .on(MODEL_SELECTOR_ROLE, &model_reply("ecommerce", "orders", 0.92))
            .on(FIELD_SELECTOR_ROLE, FIELDS_OK),
    );
    let mut session = session(Arc::clone(&layer), reasoner);

    let outcome = session.chat("What data is available?").await;
    let state = &outcome.state;
    assert_eq!(state.phase, TurnPhase::Done);
    assert_eq!(state.intent, Some(Intent::SchemaOverview));
    assert!(state.schema_loaded);
    assert!(state.error.is_none());
    assert!(state.recovered.contains(&ErrorKind::PartialSchema));
    assert!(outcome.explanation_trace.iter().any(|l| l.contains("finance")));
    assert!(outcome.final_response.unwrap().contains("No explores could be loaded"));

    let outcome = session.chat("Show me total sales by region").await;
    assert_eq!(outcome.state.phase, TurnPhase::Done);
    assert_eq!(layer.materialize_count(), 0);
    let response = outcome.final_response.unwrap();
    assert!(response.contains("No explores could be loaded"));
    assert!(response.contains('?'));
}

#[tokio::test]
async fn test_discovery_failure_aborts_turn() {
    let layer = Arc::new(TestLayer::new().failing_models());
    let mut session = session(Arc::clone(&layer), Arc::new(ScriptedReasoner::new()));

    let outcome = session.chat("What data is available?").await;

    assert_eq!(outcome.state.phase, TurnPhase::Failed);
    assert!(outcome.final_response.is_none());
    assert_eq!(
        outcome.state.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::SchemaDiscoveryFailed)
    );
    assert!(!outcome.state.schema_loaded);
}

#[tokio::test]
async fn test_reasoner_failure_is_surfaced_and_session_survives() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .failing_on(MODEL_SELECTOR_ROLE)
            .on("## User Message\nWhat data is available?", &classify_reply("schema_overview", 0.9))
            .on(CLASSIFIER_ROLE, &classify_reply("query", 0.9)),
    );
    let layer = Arc::new(TestLayer::new().with_stub_query(STUB_QUERY));
    let mut session = session(Arc::clone(&layer), reasoner);

    let outcome = session.chat("Show me total sales by region").await;
    assert_eq!(outcome.state.phase, TurnPhase::Done);
    assert_eq!(
        outcome.state.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::ExternalCallError)
    );
    assert!(outcome.final_response.unwrap().contains('?'));
    assert_eq!(layer.materialize_count(), 0);

    let next = session.chat("What data is available?").await;
    assert_eq!(next.state.phase, TurnPhase::Done);
    assert!(next.state.error.is_none());
}

#[tokio::test]
async fn test_materialization_failure_is_reported() {
    let layer = Arc::new(TestLayer::new().failing_materialize());
    let mut session = session(Arc::clone(&layer), query_reasoner(FIELDS_OK));

    let outcome = session.chat("Show me total sales by region").await;

    assert_eq!(layer.materialize_count(), 1);
    assert_eq!(outcome.state.phase, TurnPhase::Done);
    assert!(outcome.state.previous_selection.is_none());
    let response = outcome.final_response.unwrap();
    assert!(response.contains("query service returned 500"));
}

#[tokio::test]
async fn test_follow_up_sees_previous_selection() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .on("## User Message\nNow filter that to EMEA", &classify_reply("follow_up", 0.9))
            .on(CLASSIFIER_ROLE, &classify_reply("query", 0.95))
            .on(MODEL_SELECTOR_ROLE, &model_reply("ecommerce", "orders", 0.92))
            .on(FIELD_SELECTOR_ROLE, FIELDS_OK),
    );
    let layer = Arc::new(TestLayer::new().with_stub_query(STUB_QUERY));
    let mut session = session(Arc::clone(&layer), Arc::clone(&reasoner));

    session.chat("Show me total sales by region").await;
    let outcome = session.chat("Now filter that to EMEA").await;

    assert_eq!(outcome.state.intent, Some(Intent::FollowUp));
    assert_eq!(outcome.state.messages.len(), 4);
    let model_prompt = reasoner
        .prompts()
        .into_iter()
        .filter(|p| p.starts_with(MODEL_SELECTOR_ROLE))
        .last()
        .unwrap();
    assert!(model_prompt.contains("Previous selection: ecommerce.orders"));
    assert!(model_prompt.contains("User: Show me total sales by region"));

    let field_prompt = reasoner
        .prompts()
        .into_iter()
        .filter(|p| p.starts_with(FIELD_SELECTOR_ROLE))
        .last()
        .unwrap();
    assert!(field_prompt.contains("Previous selection: ecommerce.orders"));
    assert!(field_prompt.contains("orders.total_sales"));
}

#[tokio::test]
async fn test_clear_history_keeps_schema() {
    let layer = Arc::new(TestLayer::new());
    let mut session = session(Arc::clone(&layer), Arc::new(ScriptedReasoner::new()));

    session.chat("What data is available?").await;
    session.clear_history();
    assert!(session.state().messages.is_empty());
    assert!(session.state().schema_loaded);

    session.chat("What data is available?").await;
    assert_eq!(layer.list_models_count(), 1);

    session.reset().await;
    session.chat("What data is available?").await;
    assert_eq!(layer.list_models_count(), 2);
}

#[tokio::test]
async fn test_cancellation_fails_the_turn() {
    let layer = Arc::new(TestLayer::new().with_list_models_delay(Duration::from_secs(30)));
    let mut session = session(Arc::clone(&layer), Arc::new(ScriptedReasoner::new()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        session.chat_with_cancel("What data is available?", &cancel),
    )
    .await
    .expect("cancellation ends the turn promptly");

    assert_eq!(outcome.state.phase, TurnPhase::Failed);
    assert!(outcome.final_response.is_none());
    let error = outcome.state.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Cancelled);
    assert!(error.message.contains("cancelled"));
}

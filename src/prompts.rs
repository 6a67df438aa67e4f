//! Prompt templates for the reasoning calls.
//!
//! Each prompt opens with a fixed role line so delegates (and the scripted
//! reasoner used in tests) can tell the calls apart.

pub const CLASSIFIER_ROLE: &str = "You are an intent classifier for a data analytics assistant.";
pub const MODEL_SELECTOR_ROLE: &str = "You are a data model selector for semantic-layer analytics.";
pub const FIELD_SELECTOR_ROLE: &str = "You are a field selector for semantic-layer analytics.";

pub fn intent_classification(user_message: &str) -> String {
    format!(
        r#"{role}

Analyze the user's message and classify it into ONE of these intents:

1. query - the user wants to retrieve data or generate a query
   e.g. "What were total sales by region?", "How many orders did we have last month?"
2. schema_overview - the user wants to see what data is available
   e.g. "What data is available?", "Show me the schema", "What models do you have?"
3. explore_details - the user wants details about a specific explore
   e.g. "Tell me about the order_items explore", "What fields are in orders?"
4. field_explain - the user wants to understand a specific dimension or measure
   e.g. "What is total_sales?", "How is gross_margin calculated?"
5. follow_up - the user is refining a previous query
   e.g. "Filter that to Q4", "Now break it down by month"

Respond with ONLY a JSON object:
```json
{{
  "intent": "<intent_name>",
  "confidence": <0.0-1.0>,
  "reasoning": "<brief explanation>"
}}
```

## User Message
{user_message}
"#,
        role = CLASSIFIER_ROLE,
        user_message = user_message
    )
}

pub fn model_selection(schema: &str, user_question: &str, previous_context: &str) -> String {
    format!(
        r#"{role}

Given a user's question and the available schema, determine which model and explore
best match the user's intent.

## Available Schema
{schema}

## User Question
{user_question}

## Previous Context (if any)
{previous_context}

## Instructions
1. Analyze what data the user is asking for
2. Match their terminology to available dimensions and measures
3. Select the model and explore that best fits their needs
4. Only use model and explore names listed above

Respond with ONLY a JSON object:
```json
{{
  "model": "<model_name>",
  "explore": "<explore_name>",
  "confidence": <0.0-1.0>,
  "reasoning": "<why this model/explore matches>"
}}
```

If you cannot find a matching model/explore, respond with:
```json
{{
  "model": null,
  "explore": null,
  "confidence": 0.0,
  "reasoning": "<explain what's missing>",
  "clarifying_questions": ["<question to ask user>"]
}}
```
"#,
        role = MODEL_SELECTOR_ROLE,
        schema = schema,
        user_question = user_question,
        previous_context = previous_context
    )
}

pub fn field_selection(
    user_question: &str,
    model: &str,
    explore: &str,
    dimensions: &str,
    measures: &str,
    previous_context: &str,
) -> String {
    format!(
        r#"{role}

Given a user's question and the available fields in an explore, select the
dimensions and measures needed to answer it.

## CRITICAL RULES
1. You may ONLY select fields from the provided lists
2. NEVER invent or guess field names
3. If a concept has no matching field, list it under uncertain_terms and ask

## User Question
{user_question}

## Selected Model/Explore
Model: {model}
Explore: {explore}

## Available Dimensions
{dimensions}

## Available Measures
{measures}

## Previous Context (if any)
{previous_context}

Respond with ONLY a JSON object:
```json
{{
  "dimensions": ["<exact_field_name>"],
  "measures": ["<exact_field_name>"],
  "filters": {{"<field_name>": "<filter_value>"}},
  "confidence": <0.0-1.0>,
  "field_mapping": {{"<user_term>": "<field_name>"}},
  "reasoning": "<how you mapped user terms to fields>",
  "uncertain_terms": ["<term_you_couldnt_map>"],
  "clarifying_questions": ["<question>"]
}}
```
"#,
        role = FIELD_SELECTOR_ROLE,
        user_question = user_question,
        model = model,
        explore = explore,
        dimensions = dimensions,
        measures = measures,
        previous_context = previous_context
    )
}

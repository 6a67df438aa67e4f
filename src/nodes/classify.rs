//! Intent classification with a keyword fallback.

use crate::error::ErrorKind;
use crate::llm::{clamp_confidence, decode_strict, DecodePath, Decoded, Reasoner};
use crate::nodes::{percent, preview, NodeContext};
use crate::prompts;
use crate::state::{Intent, StateUpdate, TurnState};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct ClassificationReply {
    intent: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    pub reasoning: String,
}

/// Keyword rules tried in order against the lowercased utterance.
const KEYWORD_RULES: &[(Intent, &[&str])] = &[
    (
        Intent::SchemaOverview,
        &[
            "what data",
            "schema",
            "what models",
            "what can i query",
            "available data",
            "what explores",
        ],
    ),
    (
        Intent::ExploreDetails,
        &[
            "tell me about",
            "what's in",
            "what fields",
            "dimensions in",
            "measures in",
            "explore",
        ],
    ),
    (
        Intent::FieldExplain,
        &["what is ", "what does", " mean", "explain ", "how is"],
    ),
    (
        Intent::FollowUp,
        &["filter that", "add ", "break it down", "same thing", "now "],
    ),
];

const LABEL_MATCH_CONFIDENCE: f64 = 0.6;
const KEYWORD_CONFIDENCE: f64 = 0.55;
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Strict decode of a classifier reply. An unknown label is a decode failure.
pub fn parse_classification(content: &str) -> crate::error::Result<Classification> {
    let reply: ClassificationReply = decode_strict(content)?;
    let intent = Intent::parse(&reply.intent).ok_or_else(|| {
        crate::error::AgentError::Decode(format!("unknown intent label '{}'", reply.intent))
    })?;
    Ok(Classification {
        intent,
        confidence: clamp_confidence(reply.confidence.unwrap_or(DEFAULT_CONFIDENCE)),
        reasoning: reply.reasoning.unwrap_or_default(),
    })
}

/// Fallback when the reply is not usable: a single label named in the reply
/// wins, then keyword rules on the utterance, then `query`.
pub fn heuristic_classification(content: &str, utterance: &str) -> Classification {
    let reply = content.to_lowercase();
    let named: Vec<Intent> = Intent::ALL
        .into_iter()
        .filter(|i| reply.contains(i.as_str()))
        .collect();
    if let [intent] = named.as_slice() {
        return Classification {
            intent: *intent,
            confidence: LABEL_MATCH_CONFIDENCE,
            reasoning: format!("reply named '{}'", intent),
        };
    }

    let text = utterance.to_lowercase();
    for (intent, keywords) in KEYWORD_RULES {
        if let Some(k) = keywords.iter().find(|k| text.contains(*k)) {
            return Classification {
                intent: *intent,
                confidence: KEYWORD_CONFIDENCE,
                reasoning: format!("matched keyword '{}'", k.trim()),
            };
        }
    }

    Classification {
        intent: Intent::Query,
        confidence: DEFAULT_CONFIDENCE,
        reasoning: "no keyword matched; defaulting to query".to_string(),
    }
}

/// Classify one utterance. Never fails: reasoning errors and unparseable
/// replies fall through to the heuristic.
pub async fn classify(reasoner: &dyn Reasoner, utterance: &str) -> (Decoded<Classification>, Option<ErrorKind>) {
    let prompt = prompts::intent_classification(utterance);
    match reasoner.reason(&prompt, &[]).await {
        Ok(reply) => match parse_classification(&reply.content) {
            Ok(c) => (Decoded::structured(c), None),
            Err(e) => {
                warn!("Intent reply not parseable ({}), using heuristic", e);
                (
                    Decoded::heuristic(heuristic_classification(&reply.content, utterance)),
                    Some(ErrorKind::ClassificationParseFailed),
                )
            }
        },
        Err(e) => {
            warn!("Intent classification call failed: {}", e);
            (
                Decoded::heuristic(heuristic_classification("", utterance)),
                Some(ErrorKind::ExternalCallError),
            )
        }
    }
}

pub async fn classify_intent(state: &TurnState, ctx: &NodeContext) -> StateUpdate {
    let mut update = StateUpdate::new();
    let utterance = state.query_text();
    update.trace(format!("🎯 Classifying intent for: \"{}\"", preview(utterance, 50)));

    let (decoded, recovered) = classify(ctx.reasoner.as_ref(), utterance).await;
    let c = decoded.value;
    info!("Intent: {} ({})", c.intent, percent(c.confidence));

    update.trace(format!(
        "   Intent: {} (confidence: {}) via {}",
        c.intent,
        percent(c.confidence),
        decoded.path
    ));
    if !c.reasoning.is_empty() {
        update.trace(format!("   Reasoning: {}", c.reasoning));
    }
    if decoded.path == DecodePath::Heuristic {
        if let Some(kind) = recovered {
            update.recover(kind);
        }
    }

    update.intent = Some(c.intent);
    update.confidence = Some(c.confidence);
    update
}

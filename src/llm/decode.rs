//! Structured reply decoding
//!
//! Strict decode first; callers fall back to a named heuristic decoder and
//! tag the result with the [`DecodePath`] that produced it.

use crate::error::{AgentError, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::fmt;

lazy_static::lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    Structured,
    Heuristic,
}

impl fmt::Display for DecodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodePath::Structured => f.write_str("structured JSON"),
            DecodePath::Heuristic => f.write_str("heuristic fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub path: DecodePath,
}

impl<T> Decoded<T> {
    pub fn structured(value: T) -> Self {
        Self {
            value,
            path: DecodePath::Structured,
        }
    }

    pub fn heuristic(value: T) -> Self {
        Self {
            value,
            path: DecodePath::Heuristic,
        }
    }
}

/// Locate the JSON object in a reply: a fenced block if present, otherwise
/// the span from the first `{` to the last `}`.
pub fn extract_json_block(content: &str) -> Option<&str> {
    if let Some(m) = FENCED_JSON.captures(content).and_then(|c| c.get(1)) {
        return Some(m.as_str());
    }
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if start < end {
        Some(&content[start..=end])
    } else {
        None
    }
}

pub fn decode_strict<T: DeserializeOwned>(content: &str) -> Result<T> {
    let block = extract_json_block(content)
        .ok_or_else(|| AgentError::Decode("no JSON object in reply".to_string()))?;
    serde_json::from_str(block).map_err(|e| AgentError::Decode(e.to_string()))
}

/// Clamp a model-reported score into [0, 1]; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

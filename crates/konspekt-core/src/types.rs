use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One mention of a diagram or visual aid in the transcript, as
/// returned by the extraction prompt. After grouping, `context` may be
/// the space-joined contexts of several temporally adjacent mentions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramReference {
    pub timestamp: String,
    pub context: String,
}

/// Vision verdict on a single candidate frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceResult {
    pub relevant: bool,
    pub score: f64,
    pub reason: String,
}

impl RelevanceResult {
    /// The degraded default used when the vision call or its JSON
    /// output cannot be used.
    pub fn not_relevant() -> Self {
        Self {
            relevant: false,
            score: 0.0,
            reason: "Parsing failed".to_string(),
        }
    }
}

/// An accepted diagram: the persisted frame image plus the judgement
/// that let it through the relevance filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagram {
    pub timestamp: String,
    pub path: PathBuf,
    pub description: String,
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub correct_option: String,
    pub explanation: String,
    pub bloom_level: String,
    pub time_stamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub questions: Vec<Question>,
}

/// Outcome of a stage that degrades instead of failing: either the full
/// result, or a documented default with the cause that forced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback<T> {
    Full(T),
    Degraded { value: T, cause: String },
}

impl<T> Fallback<T> {
    pub fn degraded(value: T, cause: impl Into<String>) -> Self {
        Fallback::Degraded {
            value,
            cause: cause.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Fallback::Degraded { .. })
    }

    pub fn cause(&self) -> Option<&str> {
        match self {
            Fallback::Full(_) => None,
            Fallback::Degraded { cause, .. } => Some(cause),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Fallback::Full(value) => value,
            Fallback::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Fallback::Full(value) => value,
            Fallback::Degraded { value, .. } => value,
        }
    }
}

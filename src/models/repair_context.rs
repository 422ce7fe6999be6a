use serde::{Deserialize, Serialize};

/// Outcome of one query-repair run. Not persisted with the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RepairContext {
    /// Ambiguous references and the turn each was resolved against
    #[serde(default)]
    pub corrections: Vec<String>,
    /// Clarification questions the client may ask; never awaited
    #[serde(default)]
    pub questions: Vec<String>,
    /// Self-contained query used for retrieval, never empty
    pub improved_query: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_questions: Vec<String>,
    /// Fallback and guard notes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<String>,
}

impl RepairContext {
    /// The original query, untouched
    pub fn passthrough(query: &str) -> Self {
        Self {
            improved_query: query.to_string(),
            ..Default::default()
        }
    }

    /// The original query plus a single note saying why repair was skipped
    pub fn fallback(query: &str, advisory: impl Into<String>) -> Self {
        Self {
            improved_query: query.to_string(),
            advisories: vec![advisory.into()],
            ..Default::default()
        }
    }

    pub fn is_rewrite_of(&self, original: &str) -> bool {
        normalize_whitespace(&self.improved_query) != normalize_whitespace(original)
    }

    pub fn is_fallback(&self) -> bool {
        !self.advisories.is_empty()
            && self.corrections.is_empty()
            && self.assumptions.is_empty()
            && self.questions.is_empty()
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

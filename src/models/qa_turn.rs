use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::time_parser::parse_timestamp;

/// One question/answer pair of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QaTurn {
    pub turn_id: i64,
    pub user_query: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
    /// Fixed once the turn is built; empty when embedding failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    embedding: Vec<f32>,
}

impl QaTurn {
    pub fn new(
        turn_id: i64,
        user_query: impl Into<String>,
        answer: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            turn_id,
            user_query: user_query.into(),
            answer: answer.into(),
            created_at,
            embedding: Vec::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }

    /// Text that gets embedded and shown to the repair prompt
    pub fn document_text(&self) -> String {
        format!("Q: {}\nA: {}", self.user_query, self.answer)
    }
}

/// History entry as supplied by the client on `switch`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub id: i64,
    pub user_query: String,
    pub rag_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ConversationMessage {
    pub fn new(id: i64, user_query: impl Into<String>, rag_answer: impl Into<String>) -> Self {
        Self {
            id,
            user_query: user_query.into(),
            rag_answer: rag_answer.into(),
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }
}

/// Turn client history into an ordered, deduplicated turn list.
///
/// Messages are ordered by id and a repeated id keeps its last occurrence.
/// Timestamps are clamped so they never decrease; a missing or unparseable
/// timestamp inherits the previous turn's, or `now` for the first turn.
pub fn normalize_history(messages: Vec<ConversationMessage>, now: DateTime<Utc>) -> Vec<QaTurn> {
    let mut by_id: BTreeMap<i64, ConversationMessage> = BTreeMap::new();
    for message in messages {
        by_id.insert(message.id, message);
    }

    let mut previous: Option<DateTime<Utc>> = None;
    by_id
        .into_values()
        .map(|message| {
            let parsed = message
                .created_at
                .as_deref()
                .and_then(|raw| parse_timestamp(raw).ok());

            let created_at = match (parsed, previous) {
                (Some(at), Some(prev)) if at < prev => prev,
                (Some(at), _) => at,
                (None, Some(prev)) => prev,
                (None, None) => now,
            };
            previous = Some(created_at);

            QaTurn::new(message.id, message.user_query, message.rag_answer, created_at)
        })
        .collect()
}

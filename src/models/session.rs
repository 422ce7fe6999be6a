use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::qa_turn::QaTurn;
use crate::error::{RagSessionError, Result};
use crate::services::qa_index::QaIndex;

const MAX_SESSION_ID_LEN: usize = 128;

/// Externally supplied conversation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();

        if trimmed.is_empty() {
            return Err(RagSessionError::validation(
                "session_id",
                "must not be empty",
            ));
        }
        if trimmed.chars().count() > MAX_SESSION_ID_LEN {
            return Err(RagSessionError::validation(
                "session_id".to_string(),
                format!("must be at most {MAX_SESSION_ID_LEN} characters"),
            ));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(RagSessionError::validation(
                "session_id",
                "must not contain control characters",
            ));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = RagSessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = RagSessionError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Server-side state of one conversation.
///
/// The QA index owns the turns, so `turns()` and the searchable index can never
/// disagree.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Last change to turns or summaries
    pub updated_at: DateTime<Utc>,
    pub summary_all: String,
    pub summary_recent: String,
    qa_index: QaIndex,
}

impl Session {
    pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            last_accessed_at: now,
            updated_at: now,
            summary_all: String::new(),
            summary_recent: String::new(),
            qa_index: QaIndex::new(),
        }
    }

    /// Rebuild a session from its durable record. The index is derived from `turns`.
    pub fn restore(
        id: SessionId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        last_accessed_at: DateTime<Utc>,
        summary_all: String,
        summary_recent: String,
        turns: Vec<QaTurn>,
    ) -> Self {
        Self {
            id,
            created_at,
            last_accessed_at,
            updated_at,
            summary_all,
            summary_recent,
            qa_index: QaIndex::from_turns(turns),
        }
    }

    pub fn turns(&self) -> &[QaTurn] {
        self.qa_index.turns()
    }

    pub fn qa_index(&self) -> &QaIndex {
        &self.qa_index
    }

    pub fn turn_count(&self) -> usize {
        self.qa_index.len()
    }

    /// No turns and no summaries
    pub fn is_empty(&self) -> bool {
        self.qa_index.is_empty() && self.summary_all.is_empty() && self.summary_recent.is_empty()
    }

    /// Last `window` turns in chronological order
    pub fn recent_turns(&self, window: usize) -> &[QaTurn] {
        let turns = self.turns();
        &turns[turns.len().saturating_sub(window)..]
    }

    pub fn next_turn_id(&self) -> i64 {
        self.qa_index.last_turn_id().map_or(1, |id| id + 1)
    }

    /// Append a turn at the end of the history.
    ///
    /// Returns false when the turn id is already present or would break the
    /// chronological order. A `created_at` earlier than the last turn is raised
    /// to it.
    pub fn append_turn(&mut self, mut turn: QaTurn, now: DateTime<Utc>) -> bool {
        if let Some(last) = self.turns().last() {
            if turn.turn_id <= last.turn_id {
                return false;
            }
            if turn.created_at < last.created_at {
                turn.created_at = last.created_at;
            }
        }

        let inserted = self.qa_index.insert(turn);
        if inserted {
            self.updated_at = now;
        }
        inserted
    }

    /// Replace the whole history and both summaries in one step
    pub fn replace_history(
        &mut self,
        turns: Vec<QaTurn>,
        summary_all: String,
        summary_recent: String,
        now: DateTime<Utc>,
    ) {
        self.qa_index = QaIndex::from_turns(turns);
        self.summary_all = summary_all;
        self.summary_recent = summary_recent;
        self.updated_at = now;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
    }

    pub fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        is_expired_at(self.last_accessed_at, ttl, now)
    }
}

/// TTL check shared by sessions and cache entries; `None` never expires
pub fn is_expired_at(last_accessed_at: DateTime<Utc>, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
    match ttl {
        Some(ttl) => last_accessed_at + ttl <= now,
        None => false,
    }
}

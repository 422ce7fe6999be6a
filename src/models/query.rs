use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::repair_context::RepairContext;
use super::session::Session;
use crate::config::defaults;

/// Incoming question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Skip session state and query repair entirely
    #[serde(default)]
    pub eval_mode: bool,
    /// Transport framing only
    #[serde(default)]
    pub stream: bool,
}

fn default_top_k() -> usize {
    defaults::SIMILARITY_TOP_K
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: None,
            top_k: default_top_k(),
            eval_mode: false,
            stream: false,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_eval_mode(mut self, eval_mode: bool) -> Self {
        self.eval_mode = eval_mode;
        self
    }
}

/// A document chunk returned by the retriever
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedContext {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl RetrievedContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score: None,
            file: None,
            page: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GeneratedAnswer {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Wall-clock phases of one query, in seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Timing {
    pub repair_sec: f64,
    pub retrieval_sec: f64,
    /// Request start until the answer text was available
    pub ttft_sec: f64,
    pub text_gen_sec: f64,
    pub total_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Query handed to the document retriever
    pub used_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_context: Option<RepairContext>,
    pub contexts: Vec<RetrievedContext>,
    pub files: Vec<String>,
    pub timing: Timing,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Deduplicated source files in retrieval order
pub fn collect_files(contexts: &[RetrievedContext]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for file in contexts.iter().filter_map(|c| c.file.as_ref()) {
        if !files.contains(file) {
            files.push(file.clone());
        }
    }
    files
}

/// Result of `init` and `switch`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionResponse {
    pub session_id: String,
    pub turns: usize,
    pub summary_all: String,
    pub summary_recent: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SessionResponse {
    pub fn from_session(session: &Session, warnings: Vec<String>) -> Self {
        Self {
            session_id: session.id.to_string(),
            turns: session.turn_count(),
            summary_all: session.summary_all.clone(),
            summary_recent: session.summary_recent.clone(),
            created_at: session.created_at,
            last_accessed_at: session.last_accessed_at,
            warnings,
        }
    }
}

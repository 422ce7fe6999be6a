use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::config::QueryConfig;
use crate::error::{RagSessionError, Result};
use crate::models::{GeneratedAnswer, RetrievedContext};
use crate::services::llm::{GenerateRequest, TextGenerator};
use crate::utils::truncate_chars;

/// The document retriever the repaired query is handed to
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedContext>>;
}

/// Produces the final answer from the user's query and retrieved contexts
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn answer(&self, query: &str, contexts: &[RetrievedContext]) -> Result<GeneratedAnswer>;
}

/// Queries remembered by `StaticRetriever`; older ones are dropped
const SEEN_QUERY_LIMIT: usize = 32;

/// In-memory retriever ranking a fixed document set by character-bigram
/// overlap with the query. Remembers the most recent queries it was asked.
#[derive(Debug, Default)]
pub struct StaticRetriever {
    documents: Vec<RetrievedContext>,
    seen_queries: Mutex<VecDeque<String>>,
}

impl StaticRetriever {
    pub fn new(documents: Vec<RetrievedContext>) -> Self {
        Self {
            documents,
            seen_queries: Mutex::new(VecDeque::new()),
        }
    }

    /// Load a JSON array of `{text, file?, page?}` objects
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let documents: Vec<RetrievedContext> = serde_json::from_str(&content)?;
        info!(path = %path.display(), documents = documents.len(), "Loaded static contexts");
        Ok(Self::new(documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Recent queries, oldest first
    pub fn seen_queries(&self) -> Vec<String> {
        self.seen_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let mut grams = HashSet::new();
    for token in text.split_whitespace() {
        let chars: Vec<char> = token
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        if chars.len() == 1 {
            grams.insert((chars[0], ' '));
        }
        for pair in chars.windows(2) {
            grams.insert((pair[0], pair[1]));
        }
    }
    grams
}

/// Share of the query's bigrams present in `document`
pub fn lexical_overlap(query: &str, document: &str) -> f32 {
    let query_grams = bigrams(query);
    if query_grams.is_empty() {
        return 0.0;
    }
    let document_grams = bigrams(document);
    let shared = query_grams.intersection(&document_grams).count();
    shared as f32 / query_grams.len() as f32
}

#[async_trait]
impl DocumentRetriever for StaticRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedContext>> {
        {
            let mut seen = self.seen_queries.lock().unwrap_or_else(PoisonError::into_inner);
            if seen.len() == SEEN_QUERY_LIMIT {
                seen.pop_front();
            }
            seen.push_back(query.to_string());
        }

        let mut scored: Vec<(usize, f32)> = self
            .documents
            .iter()
            .enumerate()
            .map(|(i, doc)| (i, lexical_overlap(query, &doc.text)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);

        debug!(query_chars = query.chars().count(), hits = scored.len(), "Static retrieval");
        Ok(scored
            .into_iter()
            .map(|(i, score)| self.documents[i].clone().with_score(score))
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerSettings {
    pub ctx_chars_per_node: usize,
    pub ctx_max_total_chars: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

impl AnswerSettings {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            ctx_chars_per_node: config.ctx_chars_per_node,
            ctx_max_total_chars: config.ctx_max_total_chars,
            temperature: config.gen_temperature as f32,
            max_tokens: config.gen_max_tokens,
        }
    }
}

const ANSWER_SYSTEM_PROMPT: &str = "You answer questions using only the numbered document excerpts provided. \
If the excerpts do not contain the answer, say so. Cite excerpts as [n]. \
Answer in the language of the question.";

/// `AnswerGenerator` that prompts a `TextGenerator` with the retrieved contexts
pub struct LlmAnswerGenerator {
    generator: Arc<dyn TextGenerator>,
    settings: AnswerSettings,
}

impl LlmAnswerGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: AnswerSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    /// Numbered context block, each item cut to the per-node budget and the
    /// whole block to the total budget
    pub fn build_context_block(&self, contexts: &[RetrievedContext]) -> String {
        let mut block = String::new();
        let mut used = 0usize;

        for (i, context) in contexts.iter().enumerate() {
            let remaining = self.settings.ctx_max_total_chars.saturating_sub(used);
            if remaining == 0 {
                break;
            }
            let limit = self.settings.ctx_chars_per_node.min(remaining);
            let text = truncate_chars(context.text.trim(), limit);
            used += text.chars().count();

            let source = context.file.as_deref().unwrap_or("unknown");
            if !block.is_empty() {
                block.push_str("\n\n");
            }
            block.push_str(&format!("[{}] ({})\n{}", i + 1, source, text));
        }
        block
    }

    fn build_prompt(&self, query: &str, contexts: &[RetrievedContext]) -> String {
        let block = self.build_context_block(contexts);
        let block = if block.is_empty() {
            "(no documents retrieved)".to_string()
        } else {
            block
        };
        format!("Document excerpts:\n{block}\n\nQuestion: {query}\n\nAnswer:")
    }
}

/// Split a leading `<think>...</think>` block from the answer text
pub fn split_reasoning(text: &str) -> (Option<String>, String) {
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<think>") {
        if let Some(end) = rest.find("</think>") {
            let reasoning = rest[..end].trim();
            let answer = rest[end + "</think>".len()..].trim();
            let reasoning = (!reasoning.is_empty()).then(|| reasoning.to_string());
            return (reasoning, answer.to_string());
        }
    }
    (None, text.trim().to_string())
}

#[async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn answer(&self, query: &str, contexts: &[RetrievedContext]) -> Result<GeneratedAnswer> {
        let request = GenerateRequest::new(self.build_prompt(query, contexts))
            .with_system_prompt(ANSWER_SYSTEM_PROMPT)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature);

        let response = self
            .generator
            .generate(request)
            .await
            .map_err(|e| RagSessionError::generation(e.to_string()))?;

        let (reasoning, answer) = split_reasoning(&response.text);
        Ok(GeneratedAnswer { answer, reasoning })
    }
}

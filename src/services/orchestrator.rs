use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{RagSessionError, Result};
use crate::logging::log_performance;
use crate::models::{
    collect_files, normalize_history, ConversationMessage, QaTurn, QueryRequest, QueryResponse,
    RepairContext, Session, SessionId, SessionResponse, Timing,
};
use crate::services::embedding_service::Embedder;
use crate::services::query_repair::{PriorTurn, QueryRepairEngine, RepairRequest};
use crate::services::retrieval::{AnswerGenerator, DocumentRetriever};
use crate::services::session_cache::SessionCache;
use crate::services::summarizer::SessionSummarizer;

pub const MAX_TOP_K: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Turns covered by `summary_recent`
    pub recent_window: usize,
    /// Prior turns handed to query repair
    pub prior_turns_k: usize,
    pub min_relevance: f32,
    /// Record every answered query as a new turn
    pub append_query_turns: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            recent_window: config.session.recent_window,
            prior_turns_k: config.session.prior_turns_k,
            min_relevance: config.session.min_relevance as f32,
            append_query_turns: config.query.append_query_turns,
        }
    }
}

/// Prior context gathered for one repair run
struct RepairInputs {
    summary_all: String,
    summary_recent: String,
    prior_turns: Vec<PriorTurn>,
}

/// Session-aware query pipeline: `init`, `switch` and `query`.
///
/// Every external call (embedding, summarization, repair, retrieval and
/// answer generation) runs without holding the per-session lock. The lock
/// is taken only to snapshot or replace session state.
pub struct Orchestrator {
    cache: Arc<SessionCache>,
    embedder: Arc<dyn Embedder>,
    summarizer: Arc<SessionSummarizer>,
    repair: Arc<QueryRepairEngine>,
    retriever: Arc<dyn DocumentRetriever>,
    answerer: Arc<dyn AnswerGenerator>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<SessionCache>,
        embedder: Arc<dyn Embedder>,
        summarizer: Arc<SessionSummarizer>,
        repair: Arc<QueryRepairEngine>,
        retriever: Arc<dyn DocumentRetriever>,
        answerer: Arc<dyn AnswerGenerator>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            cache,
            embedder,
            summarizer,
            repair,
            retriever,
            answerer,
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Ensure a session exists. `new_session` destroys any previous state first.
    pub async fn init(&self, session_id: &str, new_session: bool) -> Result<SessionResponse> {
        let id = SessionId::new(session_id)?;
        let mut warnings = Vec::new();

        if new_session {
            if let Err(e) = self.cache.remove(&id).await {
                warnings.push(format!("failed to remove previous session state: {e}"));
            }
        }

        let mut handle = self.cache.get_or_create(&id).await;
        warnings.extend(handle.take_warnings());
        info!(session_id = %id, new_session, created = handle.is_new(), "Session initialized");
        Ok(SessionResponse::from_session(&handle, warnings))
    }

    /// Replace the session history with `messages` and regenerate both summaries
    pub async fn switch(
        &self,
        session_id: &str,
        messages: Vec<ConversationMessage>,
    ) -> Result<SessionResponse> {
        let id = SessionId::new(session_id)?;
        let started = Instant::now();
        let mut warnings = Vec::new();

        let (previous_all, previous_recent) = {
            let mut handle = self.cache.get_or_create(&id).await;
            warnings.extend(handle.take_warnings());
            (handle.summary_all.clone(), handle.summary_recent.clone())
        };

        let now = self.cache.clock().now();
        let turns = normalize_history(messages, now);
        let turns = self.embed_turns(turns, &mut warnings).await;
        let (summary_all, summary_recent) = self
            .summarizer
            .summarize_both(&turns, self.settings.recent_window, &previous_all, &previous_recent)
            .await;

        let mut handle = self.cache.get_or_create(&id).await;
        warnings.extend(handle.take_warnings());
        let turn_count = turns.len();
        handle.replace_history(turns, summary_all, summary_recent, self.cache.clock().now());
        self.cache.put(&mut handle).await;
        warnings.extend(handle.take_warnings());

        info!(
            session_id = %id,
            turns = turn_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Session history switched"
        );
        Ok(SessionResponse::from_session(&handle, warnings))
    }

    /// Answer one query, repairing it against the session's history first
    /// unless `eval_mode` is set or no session is given.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let started = Instant::now();
        validate_request(&request)?;
        let query = request.query.trim();
        let mut warnings = Vec::new();
        let mut timing = Timing::default();

        let session_id = match request.session_id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() && !request.eval_mode => Some(SessionId::new(raw)?),
            _ => None,
        };

        let repair_context = match &session_id {
            Some(id) => {
                let repair_started = Instant::now();
                let context = self.run_repair(id, query, &mut warnings).await;
                timing.repair_sec = repair_started.elapsed().as_secs_f64();
                Some(context)
            }
            None => None,
        };
        let used_query = repair_context
            .as_ref()
            .map_or_else(|| query.to_string(), |ctx| ctx.improved_query.clone());

        let retrieval_started = Instant::now();
        let contexts = self
            .retriever
            .retrieve(&used_query, request.top_k)
            .await
            .map_err(|e| match e {
                RagSessionError::Retrieval { .. } => e,
                other => RagSessionError::retrieval(other.to_string()),
            })?;
        timing.retrieval_sec = retrieval_started.elapsed().as_secs_f64();

        let generation_started = Instant::now();
        let generated = self
            .answerer
            .answer(query, &contexts)
            .await
            .map_err(|e| match e {
                RagSessionError::Generation { .. } => e,
                other => RagSessionError::generation(other.to_string()),
            })?;
        timing.text_gen_sec = generation_started.elapsed().as_secs_f64();
        timing.ttft_sec = started.elapsed().as_secs_f64();

        if self.settings.append_query_turns {
            if let Some(id) = &session_id {
                self.append_turn(id, query, &generated.answer, &mut warnings)
                    .await;
            }
        }

        timing.total_sec = started.elapsed().as_secs_f64();
        log_performance("query", (timing.total_sec * 1000.0) as u64, true);
        info!(
            session_id = session_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            eval_mode = request.eval_mode,
            stream = request.stream,
            repaired = repair_context.as_ref().is_some_and(|ctx| ctx.is_rewrite_of(query)),
            contexts = contexts.len(),
            total_ms = (timing.total_sec * 1000.0) as u64,
            "Query answered"
        );

        Ok(QueryResponse {
            answer: generated.answer,
            reasoning: generated.reasoning,
            used_query,
            repair_context,
            files: collect_files(&contexts),
            contexts,
            timing,
            warnings,
        })
    }

    /// Run only the repair stage for `query` against the session's history
    pub async fn preview_repair(&self, session_id: &str, query: &str) -> Result<RepairContext> {
        let id = SessionId::new(session_id)?;
        let query = query.trim();
        if query.is_empty() {
            return Err(RagSessionError::validation("query", "must not be empty"));
        }
        let mut warnings = Vec::new();
        let mut context = self.run_repair(&id, query, &mut warnings).await;
        context.advisories.extend(warnings);
        Ok(context)
    }

    /// Snapshot of the session with its turns, plus any storage warnings
    pub async fn history(&self, session_id: &str) -> Result<(Session, Vec<String>)> {
        let id = SessionId::new(session_id)?;
        let mut handle = self.cache.get_or_create(&id).await;
        let warnings = handle.take_warnings();
        Ok(((*handle).clone(), warnings))
    }

    async fn run_repair(
        &self,
        id: &SessionId,
        query: &str,
        warnings: &mut Vec<String>,
    ) -> RepairContext {
        if !self.repair.is_enabled() {
            // Still counts as an access for recency and TTL
            let mut handle = self.cache.get_or_create(id).await;
            warnings.extend(handle.take_warnings());
            drop(handle);
            return self.repair.repair(RepairRequest::new(query)).await;
        }

        let inputs = self.gather_repair_inputs(id, query, warnings).await;
        debug!(
            session_id = %id,
            prior_turns = inputs.prior_turns.len(),
            "Repairing query"
        );
        self.repair
            .repair(
                RepairRequest::new(query)
                    .with_summaries(&inputs.summary_all, &inputs.summary_recent)
                    .with_prior_turns(&inputs.prior_turns),
            )
            .await
    }

    async fn gather_repair_inputs(
        &self,
        id: &SessionId,
        query: &str,
        warnings: &mut Vec<String>,
    ) -> RepairInputs {
        let embedding = match self.embedder.embed_one(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Query embedding failed, skipping prior turn search");
                warnings.push(format!("query embedding failed: {e}"));
                Vec::new()
            }
        };

        let mut handle = self.cache.get_or_create(id).await;
        warnings.extend(handle.take_warnings());
        let prior_turns = handle
            .qa_index()
            .search(
                &embedding,
                self.settings.prior_turns_k,
                self.settings.min_relevance,
            )
            .iter()
            .map(PriorTurn::from)
            .collect();

        RepairInputs {
            summary_all: handle.summary_all.clone(),
            summary_recent: handle.summary_recent.clone(),
            prior_turns,
        }
    }

    async fn embed_turns(&self, turns: Vec<QaTurn>, warnings: &mut Vec<String>) -> Vec<QaTurn> {
        if turns.is_empty() {
            return turns;
        }
        let texts: Vec<String> = turns.iter().map(QaTurn::document_text).collect();
        match self.embedder.embed(&texts).await {
            Ok(vectors) if vectors.len() == turns.len() => turns
                .into_iter()
                .zip(vectors)
                .map(|(turn, vector)| turn.with_embedding(vector))
                .collect(),
            Ok(vectors) => {
                warnings.push(format!(
                    "embedding returned {} vectors for {} turns; prior turns are not searchable",
                    vectors.len(),
                    turns.len()
                ));
                turns
            }
            Err(e) => {
                warn!(error = %e, turns = turns.len(), "Turn embedding failed");
                warnings.push(format!("turn embedding failed; prior turns are not searchable: {e}"));
                turns
            }
        }
    }

    async fn append_turn(
        &self,
        id: &SessionId,
        query: &str,
        answer: &str,
        warnings: &mut Vec<String>,
    ) {
        // Embed before taking the session lock; the document text has no turn id
        let document = QaTurn::new(0, query, answer, self.cache.clock().now()).document_text();
        let embedding = match self.embedder.embed_one(&document).await {
            Ok(vector) => vector,
            Err(e) => {
                warnings.push(format!("turn embedding failed: {e}"));
                Vec::new()
            }
        };

        let mut handle = self.cache.get_or_create(id).await;
        warnings.extend(handle.take_warnings());

        let now = self.cache.clock().now();
        let turn = QaTurn::new(handle.next_turn_id(), query, answer, now).with_embedding(embedding);
        let turn_id = turn.turn_id;
        if handle.append_turn(turn, now) {
            self.cache.put(&mut handle).await;
            warnings.extend(handle.take_warnings());
            debug!(session_id = %id, turn_id, "Query recorded as turn");
        }
    }
}

fn validate_request(request: &QueryRequest) -> Result<()> {
    if request.query.trim().is_empty() {
        return Err(RagSessionError::validation("query", "must not be empty"));
    }
    if request.top_k == 0 || request.top_k > MAX_TOP_K {
        return Err(RagSessionError::validation(
            "top_k".to_string(),
            format!("must be between 1 and {MAX_TOP_K}, got {}", request.top_k),
        ));
    }
    Ok(())
}

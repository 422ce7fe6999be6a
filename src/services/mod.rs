pub mod embedding_service;
pub mod llm;
pub mod orchestrator;
pub mod qa_index;
pub mod query_repair;
pub mod retrieval;
pub mod session_cache;
pub mod summarizer;

pub use embedding_service::{build_embedder, Embedder, HashingEmbedder};
pub use orchestrator::{Orchestrator, OrchestratorSettings, MAX_TOP_K};
pub use qa_index::{cosine_similarity, QaIndex, SearchHit};
pub use query_repair::{
    PriorTurn, QueryRepairEngine, RepairOutputParser, RepairRequest, RepairSettings,
    RepairTemplate, TemplateVersion,
};
pub use retrieval::{
    AnswerGenerator, AnswerSettings, DocumentRetriever, LlmAnswerGenerator, StaticRetriever,
};
pub use session_cache::{
    spawn_sweeper, CacheSettings, MaintenanceReport, SessionCache, SessionHandle, SessionStore,
    SqliteSessionStore,
};
pub use summarizer::{SessionSummarizer, SummarizerSettings};

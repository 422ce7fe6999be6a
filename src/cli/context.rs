use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::AppConfig;
use crate::services::llm::{OpenAiCompatClient, OpenAiCompatConfig, TextGenerator};
use crate::services::{
    build_embedder, spawn_sweeper, AnswerSettings, CacheSettings, DocumentRetriever,
    LlmAnswerGenerator, Orchestrator, OrchestratorSettings, QueryRepairEngine, SessionCache,
    SessionSummarizer, SqliteSessionStore, StaticRetriever, SummarizerSettings,
};

/// Everything a CLI command needs, wired from one `AppConfig`
pub struct AppContext {
    pub config: AppConfig,
    pub db_path: PathBuf,
    pub orchestrator: Orchestrator,
    cancel: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl AppContext {
    pub fn load(config_path: Option<&Path>, contexts: Option<&Path>) -> Result<Self> {
        let config = AppConfig::resolve(config_path)?;
        let retriever: Arc<dyn DocumentRetriever> = match contexts {
            Some(path) => Arc::new(
                StaticRetriever::from_json_file(path)
                    .with_context(|| format!("Failed to load contexts from {}", path.display()))?,
            ),
            None => Arc::new(StaticRetriever::default()),
        };
        Self::build(config, retriever)
    }

    pub fn build(config: AppConfig, retriever: Arc<dyn DocumentRetriever>) -> Result<Self> {
        let db_path = config.session.db_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let store = SqliteSessionStore::open(&db_path)
            .with_context(|| format!("Failed to open session store at {}", db_path.display()))?;
        let cache = Arc::new(SessionCache::new(
            Arc::new(store),
            CacheSettings::from_config(&config.session),
        ));

        let client = Arc::new(
            OpenAiCompatClient::new(OpenAiCompatConfig::from_app_config(&config))
                .context("Failed to create LLM client")?,
        );
        let generator: Arc<dyn TextGenerator> = client.clone();
        let embedder = build_embedder(&config.embedding, Some(client))?;

        let summarizer = Arc::new(SessionSummarizer::new(
            Arc::clone(&generator),
            SummarizerSettings::from_config(&config.summary),
        ));
        let repair = Arc::new(QueryRepairEngine::from_config(
            Arc::clone(&generator),
            &config.repair,
        )?);
        let answerer = Arc::new(LlmAnswerGenerator::new(
            generator,
            AnswerSettings::from_config(&config.query),
        ));

        let orchestrator = Orchestrator::new(
            cache,
            embedder,
            summarizer,
            repair,
            retriever,
            answerer,
            OrchestratorSettings::from_config(&config),
        );
        debug!(db_path = %db_path.display(), "Application context ready");

        Ok(Self {
            config,
            db_path,
            orchestrator,
            cancel: CancellationToken::new(),
            sweeper: None,
        })
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        self.orchestrator.cache()
    }

    /// Start periodic maintenance on the configured interval
    pub fn start_sweeper(&mut self) {
        if self.sweeper.is_none() {
            self.sweeper = Some(spawn_sweeper(
                Arc::clone(self.cache()),
                self.config.session.sweep_interval(),
                self.cancel.clone(),
            ));
        }
    }

    /// Stop the sweeper and retry any unpersisted session state
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.sweeper.take() {
            handle.await.context("Session sweeper panicked")?;
        }
        self.cache().flush_dirty().await;
        Ok(())
    }
}

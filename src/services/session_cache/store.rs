use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::database::{DatabaseManager, SessionRepository};
use crate::error::{RagSessionError, Result};
use crate::models::{Session, SessionId};

/// Durable backing for the session cache
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `Err(Corrupt)` when the record exists but cannot be decoded
    async fn load(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Persist summaries, timestamps and the full turn set
    async fn save(&self, session: &Session) -> Result<()>;

    async fn touch(&self, id: &SessionId, last_accessed_at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, id: &SessionId) -> Result<()>;

    /// Delete sessions last accessed at or before `cutoff`, skipping `exclude`
    async fn purge_expired(&self, cutoff: DateTime<Utc>, exclude: &[SessionId]) -> Result<usize>;

    async fn list_ids(&self) -> Result<Vec<SessionId>>;
}

/// `SessionStore` over SQLite. Each call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteSessionStore {
    repo: Arc<SessionRepository>,
}

impl SqliteSessionStore {
    pub fn new(db: DatabaseManager) -> Self {
        Self {
            repo: Arc::new(SessionRepository::new(db)),
        }
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = DatabaseManager::new(path).map_err(|e| RagSessionError::storage(format!("{e:#}")))?;
        Ok(Self::new(db))
    }

    pub fn in_memory() -> Result<Self> {
        let db = DatabaseManager::open_in_memory()
            .map_err(|e| RagSessionError::storage(format!("{e:#}")))?;
        Ok(Self::new(db))
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SessionRepository) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || f(&repo)).await?
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        let id = id.clone();
        self.blocking(move |repo| repo.load(&id)).await
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let session = session.clone();
        self.blocking(move |repo| repo.save(&session)).await
    }

    async fn touch(&self, id: &SessionId, last_accessed_at: DateTime<Utc>) -> Result<()> {
        let id = id.clone();
        self.blocking(move |repo| repo.touch(&id, last_accessed_at).map(|_| ()))
            .await
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        let id = id.clone();
        self.blocking(move |repo| repo.delete(&id).map(|_| ())).await
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>, exclude: &[SessionId]) -> Result<usize> {
        let exclude = exclude.to_vec();
        self.blocking(move |repo| repo.purge_expired(cutoff, &exclude))
            .await
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>> {
        self.blocking(|repo| repo.list_ids()).await
    }
}

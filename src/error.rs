use thiserror::Error;

/// Errors surfaced by the session cache and query pipeline
#[derive(Error, Debug)]
pub enum RagSessionError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Corrupt session record: {session_id}: {message}")]
    Corrupt { session_id: String, message: String },

    #[error("Generation error: {message}")]
    Generation { message: String },

    #[error("Retrieval error: {message}")]
    Retrieval { message: String },

    #[error("Embedding error: {message}")]
    Embedding { message: String },

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl RagSessionError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// A stored session that exists but cannot be decoded
    pub fn corrupt<S: Into<String>>(session_id: S, message: S) -> Self {
        Self::Corrupt {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    pub fn generation<S: Into<String>>(message: S) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    pub fn retrieval<S: Into<String>>(message: S) -> Self {
        Self::Retrieval {
            message: message.into(),
        }
    }

    pub fn embedding<S: Into<String>>(message: S) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagSessionError::Io(_)
                | RagSessionError::Storage { .. }
                | RagSessionError::Generation { .. }
                | RagSessionError::Retrieval { .. }
        )
    }

    /// Whether the durable record itself is unusable
    pub fn is_corrupt(&self) -> bool {
        matches!(self, RagSessionError::Corrupt { .. })
    }

    /// Stable short label, used as a log field
    pub fn category(&self) -> &'static str {
        match self {
            RagSessionError::Database(_) => "database",
            RagSessionError::Io(_) => "io",
            RagSessionError::Json(_) => "json",
            RagSessionError::InvalidConfig { .. } => "config",
            RagSessionError::Storage { .. } => "storage",
            RagSessionError::Corrupt { .. } => "corrupt",
            RagSessionError::Generation { .. } => "generation",
            RagSessionError::Retrieval { .. } => "retrieval",
            RagSessionError::Embedding { .. } => "embedding",
            RagSessionError::TaskJoin(_) => "task",
            RagSessionError::Validation { .. } => "validation",
            RagSessionError::NotFound { .. } => "not_found",
            RagSessionError::Unknown { .. } => "unknown",
        }
    }
}

impl From<anyhow::Error> for RagSessionError {
    fn from(err: anyhow::Error) -> Self {
        RagSessionError::Unknown {
            message: format!("{err:#}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagSessionError>;

//! Environment variable constants used throughout the application
//!
//! Every variable overrides the matching value in config.toml.

/// Logging configuration
pub mod logging {
    /// Log level configuration (e.g., "debug", "info", "warn", "error")
    pub const LOG_LEVEL: &str = "RAGSESSION_LOG_LEVEL";

    /// Full tracing filter directive, takes precedence over LOG_LEVEL
    pub const LOG_FILTER: &str = "RAGSESSION_LOG";

    /// Log file path for file-based logging
    pub const LOG_FILE: &str = "RAGSESSION_LOG_FILE";

    /// Emit JSON formatted log lines
    pub const LOG_JSON: &str = "RAGSESSION_LOG_JSON";

    /// Disable colored output (follows the NO_COLOR standard)
    pub const NO_COLOR: &str = "NO_COLOR";
}

/// Session cache configuration
pub mod session {
    /// Maximum number of resident sessions
    pub const MAX_SESSIONS: &str = "RAGSESSION_SESSION_MAX_COUNT";

    /// Idle time before a session is destroyed, in hours
    pub const TTL_HOURS: &str = "RAGSESSION_SESSION_TTL_HOURS";

    /// Size of the recent summary window
    pub const RECENT_WINDOW: &str = "RAGSESSION_RECENT_QA_WINDOW";

    /// SQLite file backing the session cache
    pub const CACHE_DB_PATH: &str = "RAGSESSION_SESSION_CACHE_DB";
}

/// Query repair configuration
pub mod repair {
    /// "true"/"false" switch for the repair engine
    pub const ENABLED: &str = "RAGSESSION_ENABLE_QUERY_REPAIR";

    /// Token budget of the repair generation call
    pub const MAX_TOKENS: &str = "RAGSESSION_REPAIR_MAX_TOKENS";

    /// Sampling temperature of the repair generation call
    pub const TEMPERATURE: &str = "RAGSESSION_REPAIR_TEMPERATURE";

    /// Template version ("v1", "v2")
    pub const TEMPLATE: &str = "RAGSESSION_REPAIR_TEMPLATE";
}

/// Summary configuration
pub mod summary {
    /// Token budget of each summary call
    pub const MAX_TOKENS: &str = "RAGSESSION_SUMMARY_MAX_TOKENS";
}

/// OpenAI-compatible generation endpoint
pub mod llm {
    /// Base URL, e.g. http://localhost:30000/v1
    pub const BASE_URL: &str = "RAGSESSION_LLM_BASE_URL";

    /// Bearer key for the endpoint
    pub const API_KEY: &str = "RAGSESSION_LLM_API_KEY";

    /// Model identifier sent with every request
    pub const MODEL: &str = "RAGSESSION_LLM_MODEL";
}

//! Default values for every configuration section.

pub const APP_DIR_NAME: &str = ".ragsession";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SESSION_DB_FILE_NAME: &str = "sessions.db";

// session cache
pub const SESSION_MAX_COUNT: usize = 100;
pub const SESSION_TTL_HOURS: u64 = 72;
pub const RECENT_QA_WINDOW: usize = 5;
pub const PRIOR_TURNS_K: usize = 3;
pub const MIN_RELEVANCE: f64 = 0.05;
pub const SWEEP_INTERVAL_SECS: u64 = 300;

// query repair
pub const ENABLE_QUERY_REPAIR: bool = true;
pub const REPAIR_MAX_TOKENS: u32 = 800;
pub const REPAIR_TEMPERATURE: f64 = 0.3;
pub const REPAIR_TIMEOUT_SECS: u64 = 60;
pub const REPAIR_TEMPLATE: &str = "v2";
pub const PRIOR_TURN_CHARS: usize = 800;

// summaries
pub const SUMMARY_MAX_TOKENS: u32 = 600;
pub const SUMMARY_TEMPERATURE: f64 = 0.3;
pub const SUMMARY_TIMEOUT_SECS: u64 = 30;
pub const SUMMARY_ALL_CHARS: usize = 300;
pub const SUMMARY_RECENT_CHARS: usize = 200;
pub const SUMMARY_ANSWER_CHARS: usize = 500;

// generation endpoint
pub const LLM_BASE_URL: &str = "http://localhost:30000/v1";
pub const LLM_MODEL: &str = "default";
pub const LLM_TIMEOUT_SECS: u64 = 120;
pub const LLM_MAX_RETRIES: usize = 3;
pub const LLM_MAX_CONCURRENT: usize = 8;

// embeddings
pub const EMBED_DIMENSION: usize = 768;
pub const EMBED_BATCH_SIZE: usize = 8;

// query path
pub const SIMILARITY_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 50;
pub const CTX_CHARS_PER_NODE: usize = 900;
pub const CTX_MAX_TOTAL_CHARS: usize = 6000;
pub const GEN_TEMPERATURE: f64 = 0.2;
pub const GEN_MAX_OUTPUT_TOKENS: u32 = 600;

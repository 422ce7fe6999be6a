//! Configuration file management
//!
//! Values are read from ~/.ragsession/config.toml (or an explicit path) and can be
//! overridden by environment variables. Keys are addressed with dotted paths such as
//! `session.max_sessions` or `repair.enabled`.

pub mod defaults;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::env;
use crate::error::RagSessionError;
use crate::services::query_repair::TemplateVersion;

/// Top-level configuration matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub repair: RepairConfig,
    pub summary: SummaryConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of sessions kept in memory
    pub max_sessions: usize,
    /// Idle hours before a session is destroyed; 0 disables expiry
    pub ttl_hours: u64,
    /// Number of turns covered by the recent summary
    pub recent_window: usize,
    /// Prior turns handed to query repair
    pub prior_turns_k: usize,
    /// Minimum cosine similarity for a prior turn to count as relevant
    pub min_relevance: f64,
    pub sweep_interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_db_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: defaults::SESSION_MAX_COUNT,
            ttl_hours: defaults::SESSION_TTL_HOURS,
            recent_window: defaults::RECENT_QA_WINDOW,
            prior_turns_k: defaults::PRIOR_TURNS_K,
            min_relevance: defaults::MIN_RELEVANCE,
            sweep_interval_secs: defaults::SWEEP_INTERVAL_SECS,
            cache_db_path: None,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Option<chrono::Duration> {
        if self.ttl_hours == 0 {
            None
        } else {
            chrono::Duration::try_hours(self.ttl_hours as i64)
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Resolve the SQLite path, defaulting to ~/.ragsession/sessions.db
    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.cache_db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(app_dir()?.join(defaults::SESSION_DB_FILE_NAME)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepairConfig {
    pub enabled: bool,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
    /// Built-in template version, "v1" or "v2"
    pub template: String,
    /// Custom template file, takes precedence over `template`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,
    pub prior_turn_chars: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::ENABLE_QUERY_REPAIR,
            max_tokens: defaults::REPAIR_MAX_TOKENS,
            temperature: defaults::REPAIR_TEMPERATURE,
            timeout_secs: defaults::REPAIR_TIMEOUT_SECS,
            template: defaults::REPAIR_TEMPLATE.to_string(),
            template_path: None,
            prior_turn_chars: defaults::PRIOR_TURN_CHARS,
        }
    }
}

impl RepairConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SummaryConfig {
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
    /// Character budget requested for the whole-history summary
    pub summary_all_chars: usize,
    /// Character budget requested for the recent-window summary
    pub summary_recent_chars: usize,
    /// Answers are cut to this many characters inside summary prompts
    pub answer_chars: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_tokens: defaults::SUMMARY_MAX_TOKENS,
            temperature: defaults::SUMMARY_TEMPERATURE,
            timeout_secs: defaults::SUMMARY_TIMEOUT_SECS,
            summary_all_chars: defaults::SUMMARY_ALL_CHARS,
            summary_recent_chars: defaults::SUMMARY_RECENT_CHARS,
            answer_chars: defaults::SUMMARY_ANSWER_CHARS,
        }
    }
}

impl SummaryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub max_concurrent: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::LLM_BASE_URL.to_string(),
            api_key: None,
            model: defaults::LLM_MODEL.to_string(),
            timeout_secs: defaults::LLM_TIMEOUT_SECS,
            max_retries: defaults::LLM_MAX_RETRIES,
            max_concurrent: defaults::LLM_MAX_CONCURRENT,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Offline feature-hashing embedder
    #[default]
    Hashing,
    /// `/embeddings` on the configured endpoint
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub dimension: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            dimension: defaults::EMBED_DIMENSION,
            model: None,
            batch_size: defaults::EMBED_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: usize,
    pub ctx_chars_per_node: usize,
    pub ctx_max_total_chars: usize,
    pub gen_temperature: f64,
    pub gen_max_tokens: u32,
    /// Record every answered query as a new turn of its session
    pub append_query_turns: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: defaults::SIMILARITY_TOP_K,
            ctx_chars_per_node: defaults::CTX_CHARS_PER_NODE,
            ctx_max_total_chars: defaults::CTX_MAX_TOTAL_CHARS,
            gen_temperature: defaults::GEN_TEMPERATURE,
            gen_max_tokens: defaults::GEN_MAX_OUTPUT_TOKENS,
            append_query_turns: false,
        }
    }
}

/// Keys whose default is "unset" and therefore absent from the serialized form
const OPTIONAL_KEYS: &[&str] = &[
    "session.cache_db_path",
    "repair.template_path",
    "llm.api_key",
    "embedding.model",
];

const SECRET_KEYS: &[&str] = &["llm.api_key"];

/// Environment overrides, applied in this order
const ENV_OVERRIDES: &[(&str, &str)] = &[
    (env::session::MAX_SESSIONS, "session.max_sessions"),
    (env::session::TTL_HOURS, "session.ttl_hours"),
    (env::session::RECENT_WINDOW, "session.recent_window"),
    (env::session::CACHE_DB_PATH, "session.cache_db_path"),
    (env::repair::ENABLED, "repair.enabled"),
    (env::repair::MAX_TOKENS, "repair.max_tokens"),
    (env::repair::TEMPERATURE, "repair.temperature"),
    (env::repair::TEMPLATE, "repair.template"),
    (env::summary::MAX_TOKENS, "summary.max_tokens"),
    (env::llm::BASE_URL, "llm.base_url"),
    (env::llm::API_KEY, "llm.api_key"),
    (env::llm::MODEL, "llm.model"),
];

/// ~/.ragsession
pub fn app_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().context("Could not find home directory")?;
    Ok(home_dir.join(defaults::APP_DIR_NAME))
}

impl AppConfig {
    /// Get the config file path (~/.ragsession/config.toml)
    pub fn get_config_path() -> Result<PathBuf> {
        Ok(app_dir()?.join(defaults::CONFIG_FILE_NAME))
    }

    /// Load from the default path. Returns defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    /// Load file values, then apply environment overrides and validate
    pub fn resolve(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        // owner read/write only, the file may hold an API key
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = fs::Permissions::from_mode(0o600);
            fs::set_permissions(config_path, permissions).with_context(|| {
                format!(
                    "Failed to set permissions on config file: {}",
                    config_path.display()
                )
            })?;
        }

        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        for (var, key) in ENV_OVERRIDES {
            if let Ok(value) = std::env::var(var) {
                if value.is_empty() {
                    continue;
                }
                self.set(key, value)
                    .with_context(|| format!("Invalid value in environment variable {var}"))?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.session.max_sessions == 0 {
            return Err(RagSessionError::invalid_config(
                "session.max_sessions must be at least 1",
            ));
        }
        if self.session.recent_window == 0 {
            return Err(RagSessionError::invalid_config(
                "session.recent_window must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.session.min_relevance) {
            return Err(RagSessionError::invalid_config(
                "session.min_relevance must be within 0.0..=1.0",
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(RagSessionError::invalid_config(
                "embedding.dimension must be at least 1",
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagSessionError::invalid_config(
                "embedding.batch_size must be at least 1",
            ));
        }
        if self.repair.template_path.is_none() {
            self.repair
                .template
                .parse::<TemplateVersion>()
                .map_err(RagSessionError::invalid_config)?;
        }
        if self.query.top_k == 0 || self.query.top_k > defaults::MAX_TOP_K {
            return Err(RagSessionError::invalid_config(format!(
                "query.top_k must be within 1..={}",
                defaults::MAX_TOP_K
            )));
        }
        Ok(())
    }

    /// Get a config value by dotted key
    pub fn get(&self, key: &str) -> Option<String> {
        let table = toml::Value::try_from(self).ok()?;
        lookup(&table, key).map(display_value)
    }

    /// Set a config value by dotted key, parsed as the type the key already holds
    pub fn set(&mut self, key: &str, value: String) -> Result<()> {
        let mut table = toml::Value::try_from(&*self).context("Failed to serialize config")?;
        let (section, field) = split_key(key)?;

        let current = lookup(&table, key).cloned();
        let parsed = match current {
            Some(toml::Value::Boolean(_)) => toml::Value::Boolean(
                parse_bool(&value).with_context(|| format!("{key} expects true or false"))?,
            ),
            Some(toml::Value::Integer(_)) => toml::Value::Integer(
                value
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} expects an integer"))?,
            ),
            Some(toml::Value::Float(_)) => toml::Value::Float(
                value
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} expects a number"))?,
            ),
            Some(_) => toml::Value::String(value),
            None if OPTIONAL_KEYS.contains(&key) => toml::Value::String(value),
            None => bail!("Unknown config key: {}", key),
        };

        section_table(&mut table, section)?.insert(field.to_string(), parsed);
        *self = table
            .try_into()
            .with_context(|| format!("Invalid value for {key}"))?;
        Ok(())
    }

    /// Reset a config value to its default
    pub fn unset(&mut self, key: &str) -> Result<()> {
        let mut table = toml::Value::try_from(&*self).context("Failed to serialize config")?;
        let (section, field) = split_key(key)?;

        if lookup(&table, key).is_none() && !OPTIONAL_KEYS.contains(&key) {
            bail!("Unknown config key: {}", key);
        }

        section_table(&mut table, section)?.remove(field);
        *self = table.try_into().context("Failed to rebuild config")?;
        Ok(())
    }

    /// All set values as dotted key-value pairs, secrets masked
    pub fn list(&self) -> Vec<(String, String)> {
        let mut items = Vec::new();
        let Ok(toml::Value::Table(root)) = toml::Value::try_from(self) else {
            return items;
        };

        for (section, values) in root {
            if let toml::Value::Table(values) = values {
                for (field, value) in values {
                    let key = format!("{section}.{field}");
                    let shown = if SECRET_KEYS.contains(&key.as_str()) {
                        mask_api_key(&display_value(&value))
                    } else {
                        display_value(&value)
                    };
                    items.push((key, shown));
                }
            }
        }

        items
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('.') {
        Some((section, field)) if !section.is_empty() && !field.is_empty() => {
            Ok((section, field))
        }
        _ => bail!("Config keys look like section.field, got: {}", key),
    }
}

fn lookup<'a>(table: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    let (section, field) = key.split_once('.')?;
    table.get(section)?.get(field)
}

fn section_table<'a>(
    table: &'a mut toml::Value,
    section: &str,
) -> Result<&'a mut toml::map::Map<String, toml::Value>> {
    match table.get_mut(section) {
        Some(toml::Value::Table(values)) => Ok(values),
        _ => bail!("Unknown config section: {}", section),
    }
}

fn display_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Mask API key for display (show first 4 and last 4 characters)
fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::env::logging as env_vars;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// How the log file is split over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogRotation {
    /// One file, appended forever
    #[default]
    Never,
    /// `<name>.YYYY-MM-DD`, one per day
    Daily,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub stdout: bool,
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    pub json_format: bool,
    /// ANSI colors on stdout; files never get them
    pub use_colors: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            stdout: true,
            file_path: None,
            rotation: LogRotation::Never,
            json_format: false,
            use_colors: true,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_stdout(mut self, enabled: bool) -> Self {
        self.stdout = enabled;
        self
    }

    pub fn with_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.use_colors = enabled;
        self
    }

    /// Defaults overridden by `RAGSESSION_LOG_*` and `NO_COLOR`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(level) = env::var(env_vars::LOG_LEVEL).ok().and_then(|v| parse_level(&v)) {
            config.level = level;
        }
        config.file_path = env::var(env_vars::LOG_FILE)
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        config.json_format = env::var(env_vars::LOG_JSON).is_ok_and(|v| is_truthy(&v));
        config.use_colors = env::var_os(env_vars::NO_COLOR).is_none();
        config
    }

    pub fn development() -> Self {
        Self::default().with_level(Level::DEBUG)
    }

    /// JSON lines to a daily file, nothing on stdout
    pub fn production() -> Self {
        Self::default()
            .with_stdout(false)
            .with_file(PathBuf::from("logs").join("ragsession.log"))
            .with_rotation(LogRotation::Daily)
            .with_json_format(true)
            .with_colors(false)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

pub fn parse_level(value: &str) -> Option<Level> {
    match value.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

fn file_appender(path: &Path, rotation: LogRotation) -> Result<RollingFileAppender> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    std::fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create log directory: {}", directory.display()))?;

    let rotation = match rotation {
        LogRotation::Never => Rotation::NEVER,
        LogRotation::Daily => Rotation::DAILY,
    };
    Ok(RollingFileAppender::new(rotation, directory, file_name))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit when a file sink is configured;
/// dropping it discards buffered lines.
pub fn init_logging(config: LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level).into())
        .parse_lossy(env::var(env_vars::LOG_FILTER).unwrap_or_default());

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.stdout {
        let layer = fmt::layer().with_target(true);
        layers.push(if config.json_format {
            layer.json().boxed()
        } else {
            layer.with_ansi(config.use_colors).boxed()
        });
    }

    let guard = match &config.file_path {
        Some(path) => {
            let (writer, guard) =
                tracing_appender::non_blocking(file_appender(path, config.rotation)?);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            layers.push(if config.json_format {
                layer.json().boxed()
            } else {
                layer.boxed()
            });
            Some(guard)
        }
        None => None,
    };

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(
        level = %config.level,
        file = ?config.file_path,
        rotation = ?config.rotation,
        json = config.json_format,
        "Logging initialized"
    );
    Ok(guard)
}

pub fn log_error<E: std::fmt::Display>(error: &E, context: &str) {
    tracing::error!(error = %error, context, "Error occurred");
}

pub fn log_performance(operation: &str, duration_ms: u64, success: bool) {
    if success {
        tracing::info!(operation, duration_ms, "Operation completed");
    } else {
        tracing::warn!(operation, duration_ms, "Operation failed");
    }
}

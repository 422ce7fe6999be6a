use backoff::{backoff::Backoff, ExponentialBackoff};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

use super::errors::{LlmError, RetryError};

/// Errors the retry loop can classify
pub trait Retryable: std::error::Error + 'static {
    fn is_retryable(&self) -> bool;

    /// Delay the server asked for, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        LlmError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after_secs().map(Duration::from_secs)
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total calls including the first one, never below 1
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    /// No new attempt starts once this much time has passed
    pub total_timeout: Duration,
    pub honor_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
            total_timeout: Duration::from_secs(120),
            honor_retry_after: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max.max(initial);
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn with_honor_retry_after(mut self, honor: bool) -> Self {
        self.honor_retry_after = honor;
        self
    }
}

/// Runs an operation under a `RetryConfig`.
///
/// The handler holds no per-run state, so one instance can drive any number
/// of concurrent operations.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    config: RetryConfig,
}

impl RetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_delay,
            max_interval: self.config.max_delay,
            multiplier: self.config.multiplier,
            randomization_factor: if self.config.jitter { 0.5 } else { 0.0 },
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Pause before the next attempt, or `None` when the error is final
    fn next_delay<E: Retryable>(
        &self,
        error: &E,
        attempt: usize,
        elapsed: Duration,
        backoff: &mut ExponentialBackoff,
    ) -> Option<Duration> {
        if !error.is_retryable() || attempt >= self.config.max_attempts {
            return None;
        }

        let server_hint = error.retry_after().filter(|_| self.config.honor_retry_after);
        let delay = server_hint
            .or_else(|| backoff.next_backoff())
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay);

        (elapsed + delay < self.config.total_timeout).then_some(delay)
    }

    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let started = Instant::now();
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.next_delay(&error, attempt, started.elapsed(), &mut backoff) {
                Some(delay) => {
                    warn!(
                        attempt,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                None if !error.is_retryable() => {
                    return Err(RetryError::NonRetryable { source: error })
                }
                None if attempt >= self.config.max_attempts => {
                    return Err(RetryError::MaxAttemptsExceeded {
                        attempts: attempt,
                        last_error: error,
                    })
                }
                None => return Err(RetryError::TimeoutExceeded),
            }
        }
    }
}

pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    RetryHandler::new(config).run(operation).await
}

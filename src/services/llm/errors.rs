use thiserror::Error;

/// Errors from an OpenAI-compatible generation or embedding endpoint
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimitExceeded { .. } => true,
            LlmError::Timeout { .. } => true,
            LlmError::NetworkError { .. } => true,
            LlmError::ServerError { status, .. } => *status >= 500,
            LlmError::ServiceUnavailable { .. } => true,
            _ => false,
        }
    }

    pub fn is_timeout_error(&self) -> bool {
        matches!(self, LlmError::Timeout { .. })
    }

    /// Delay requested by the server through Retry-After
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            LlmError::RateLimitExceeded {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            LlmError::AuthenticationFailed { .. } => {
                "Generation endpoint rejected the API key.".to_string()
            }
            LlmError::RateLimitExceeded { .. } => {
                "Generation endpoint rate limit exceeded. Please wait a moment and try again."
                    .to_string()
            }
            LlmError::Timeout { timeout_ms } => {
                format!("Generation request timed out after {timeout_ms}ms.")
            }
            LlmError::NetworkError { .. } => {
                "Could not reach the generation endpoint. Is the server running?".to_string()
            }
            LlmError::InvalidRequest { message } => format!("Invalid request: {message}"),
            LlmError::ServerError { .. } | LlmError::ServiceUnavailable { .. } => {
                "Generation endpoint is experiencing issues. Please try again later.".to_string()
            }
            LlmError::ParseError { .. } | LlmError::InvalidResponse { .. } => {
                "Received an unusable response from the generation endpoint.".to_string()
            }
            LlmError::ConfigurationError { message } => format!("Configuration error: {message}"),
        }
    }

    pub fn from_reqwest_error(error: reqwest::Error, timeout_ms: u64) -> Self {
        if error.is_timeout() {
            LlmError::Timeout { timeout_ms }
        } else if let Some(status) = error.status() {
            Self::from_status_and_body(status, &error.to_string(), None)
        } else if error.is_decode() {
            LlmError::ParseError {
                message: error.to_string(),
            }
        } else {
            LlmError::NetworkError {
                message: error.to_string(),
            }
        }
    }

    pub fn from_status_and_body(
        status: reqwest::StatusCode,
        body: &str,
        retry_after_secs: Option<u64>,
    ) -> Self {
        let status_code = status.as_u16();

        // OpenAI-style bodies carry {"error": {"message": ...}}
        let error_message =
            if let Ok(error_response) = serde_json::from_str::<serde_json::Value>(body) {
                error_response
                    .get("error")
                    .and_then(|e| e.get("message").or(Some(e)))
                    .and_then(|m| m.as_str())
                    .unwrap_or(body)
                    .to_string()
            } else {
                body.to_string()
            };

        match status_code {
            400 | 404 | 422 => LlmError::InvalidRequest {
                message: error_message,
            },
            401 | 403 => LlmError::AuthenticationFailed {
                message: error_message,
            },
            429 => LlmError::RateLimitExceeded {
                message: error_message,
                retry_after_secs,
            },
            503 => LlmError::ServiceUnavailable {
                message: error_message,
            },
            500..=599 => LlmError::ServerError {
                status: status_code,
                message: error_message,
            },
            _ => LlmError::InvalidRequest {
                message: format!("HTTP {status_code}: {error_message}"),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("Maximum retry attempts exceeded after {attempts} attempts: {last_error}")]
    MaxAttemptsExceeded { attempts: usize, last_error: E },

    #[error("Retry timeout exceeded")]
    TimeoutExceeded,

    #[error("Non-retryable error: {source}")]
    NonRetryable { source: E },
}

use async_trait::async_trait;

use super::errors::LlmError;
use super::types::{GenerateRequest, GenerateResponse};

/// Text-generation capability used by the summarizer, query repair and
/// answer generation.
///
/// Components receive an implementation explicitly, so tests can hand in a
/// scripted generator that returns canned completions, errors or delays.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError>;

    /// Model identifier, for logging
    fn model_name(&self) -> &str;
}

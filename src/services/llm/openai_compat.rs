use async_trait::async_trait;
use reqwest::{header, Client, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use super::errors::{LlmError, RetryError};
use super::models::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, EmbeddingRequest,
    EmbeddingResponse,
};
use super::retry::{with_retry, RetryConfig};
use super::traits::TextGenerator;
use super::types::{GenerateRequest, GenerateResponse, TokenUsage};
use crate::config::{defaults, AppConfig};
use crate::error::{RagSessionError, Result};
use crate::services::embedding_service::Embedder;

#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: Option<String>,
    pub embedding_dimension: usize,
    pub embedding_batch_size: usize,
    pub timeout: Duration,
    pub max_retries: usize,
    pub max_concurrent: usize,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::LLM_BASE_URL.to_string(),
            api_key: None,
            model: defaults::LLM_MODEL.to_string(),
            embedding_model: None,
            embedding_dimension: defaults::EMBED_DIMENSION,
            embedding_batch_size: defaults::EMBED_BATCH_SIZE,
            timeout: Duration::from_secs(defaults::LLM_TIMEOUT_SECS),
            max_retries: defaults::LLM_MAX_RETRIES,
            max_concurrent: defaults::LLM_MAX_CONCURRENT,
        }
    }
}

impl OpenAiCompatConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.llm.base_url.clone(),
            api_key: config.llm.api_key.clone().filter(|key| !key.is_empty()),
            model: config.llm.model.clone(),
            embedding_model: config.embedding.model.clone(),
            embedding_dimension: config.embedding.dimension,
            embedding_batch_size: config.embedding.batch_size,
            timeout: Duration::from_secs(config.llm.timeout_secs),
            max_retries: config.llm.max_retries,
            max_concurrent: config.llm.max_concurrent,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_embedding(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.embedding_model = Some(model.into());
        self.embedding_dimension = dimension;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), LlmError> {
        if self.base_url.trim().is_empty() {
            return Err(LlmError::ConfigurationError {
                message: "Base URL cannot be empty".to_string(),
            });
        }

        if self.model.trim().is_empty() {
            return Err(LlmError::ConfigurationError {
                message: "Model name cannot be empty".to_string(),
            });
        }

        if self.max_concurrent == 0 {
            return Err(LlmError::ConfigurationError {
                message: "max_concurrent must be at least 1".to_string(),
            });
        }

        if self.embedding_batch_size == 0 {
            return Err(LlmError::ConfigurationError {
                message: "Embedding batch size must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// Client for servers speaking the OpenAI chat-completions and embeddings APIs
/// (vLLM, SGLang, llama.cpp server and similar).
#[derive(Clone)]
pub struct OpenAiCompatClient {
    config: OpenAiCompatConfig,
    client: Client,
    limiter: Arc<Semaphore>,
}

impl OpenAiCompatClient {
    pub fn new(config: OpenAiCompatConfig) -> std::result::Result<Self, LlmError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::ConfigurationError {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        let limiter = Arc::new(Semaphore::new(config.max_concurrent));

        Ok(Self {
            config,
            client,
            limiter,
        })
    }

    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }

    fn retry_config(&self) -> RetryConfig {
        // max_retries counts retries, not attempts
        RetryConfig::new(self.config.max_retries + 1).with_total_timeout(self.config.timeout * 2)
    }

    fn unwrap_retry_error(&self, retry_error: RetryError<LlmError>) -> LlmError {
        match retry_error {
            RetryError::NonRetryable { source } => source,
            RetryError::MaxAttemptsExceeded { last_error, .. } => last_error,
            RetryError::TimeoutExceeded => LlmError::Timeout {
                timeout_ms: self.config.timeout_ms(),
            },
        }
    }

    pub async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> std::result::Result<ChatCompletionResponse, LlmError> {
        with_retry(self.retry_config(), || {
            self.post_json_once::<_, ChatCompletionResponse>("chat/completions", &request)
        })
        .await
        .map_err(|e| self.unwrap_retry_error(e))
    }

    async fn post_json_once<B, T>(&self, path: &str, body: &B) -> std::result::Result<T, LlmError>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| LlmError::ServiceUnavailable {
                message: "Request limiter closed".to_string(),
            })?;

        let mut builder = self
            .client
            .post(self.config.endpoint(path))
            .header(header::CONTENT_TYPE, "application/json")
            .json(body);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = timeout(self.config.timeout, builder.send())
            .await
            .map_err(|_| LlmError::Timeout {
                timeout_ms: self.config.timeout_ms(),
            })?
            .map_err(|e| LlmError::from_reqwest_error(e, self.config.timeout_ms()))?;

        self.handle_response(response).await
    }

    async fn handle_response<T>(&self, response: Response) -> std::result::Result<T, LlmError>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();

        if status.is_success() {
            let response_text = response
                .text()
                .await
                .map_err(|e| LlmError::from_reqwest_error(e, self.config.timeout_ms()))?;

            serde_json::from_str(&response_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {e}"),
            })
        } else {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            Err(LlmError::from_status_and_body(
                status,
                &error_body,
                retry_after,
            ))
        }
    }

    fn build_chat_request(&self, request: GenerateRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = request.system_prompt {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(request.prompt));

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        }
    }

    async fn embed_batch(&self, inputs: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        let model = self
            .config
            .embedding_model
            .as_deref()
            .unwrap_or(self.config.model.as_str());
        let request = EmbeddingRequest {
            model,
            input: inputs,
        };

        let mut response: EmbeddingResponse = with_retry(self.retry_config(), || {
            self.post_json_once::<_, EmbeddingResponse>("embeddings", &request)
        })
        .await
        .map_err(|e| self.unwrap_retry_error(e))?;

        if response.data.len() != inputs.len() {
            return Err(LlmError::InvalidResponse {
                message: format!(
                    "Expected {} embeddings, received {}",
                    inputs.len(),
                    response.data.len()
                ),
            });
        }

        response.data.sort_by_key(|item| item.index);
        Ok(response.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatClient {
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, LlmError> {
        let chat_request = self.build_chat_request(request);
        let response = self.chat_completion(chat_request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "Response contained no choices".to_string(),
            })?;

        let text = choice
            .message
            .content
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "Response message had no content".to_string(),
            })?;

        Ok(GenerateResponse {
            text,
            token_usage: response.usage.map(|usage| TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
            model_used: response.model,
            finish_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Embedder for OpenAiCompatClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.embedding_batch_size) {
            let vectors = self
                .embed_batch(batch)
                .await
                .map_err(|e| RagSessionError::embedding(e.to_string()))?;

            for vector in &vectors {
                if vector.len() != self.config.embedding_dimension {
                    return Err(RagSessionError::embedding(format!(
                        "Expected dimension {}, received {}",
                        self.config.embedding_dimension,
                        vector.len()
                    )));
                }
            }
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    fn name(&self) -> &str {
        "openai-compat"
    }
}

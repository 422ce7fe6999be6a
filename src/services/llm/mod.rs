pub mod errors;
pub mod models;
pub mod openai_compat;
pub mod retry;
pub mod traits;
pub mod types;

pub use errors::{LlmError, RetryError};
pub use openai_compat::{OpenAiCompatClient, OpenAiCompatConfig};
pub use retry::{with_retry, RetryConfig, RetryHandler, Retryable};
#[cfg(test)]
pub use traits::MockTextGenerator;
pub use traits::TextGenerator;
pub use types::{GenerateRequest, GenerateResponse, TokenUsage};

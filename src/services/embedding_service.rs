//! Text embeddings for the per-session QA index.
//!
//! Two backends are available:
//! - `HashingEmbedder`: deterministic feature hashing, works offline (default)
//! - `OpenAiCompatClient`: a remote `/embeddings` endpoint

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::{defaults, EmbeddingConfig, EmbeddingProvider};
use crate::error::{RagSessionError, Result};
use crate::services::llm::OpenAiCompatClient;

/// Longest character n-gram hashed per token
const MAX_NGRAM: usize = 3;

/// Turns texts into fixed-size vectors comparable by cosine similarity
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagSessionError::embedding("Embedder returned no vector"))
    }
}

/// Feature-hashing embedder over character n-grams.
///
/// Each whitespace-delimited token is lowercased and split into character
/// n-grams of length 1 to 3. Every n-gram is hashed with xxh3 into one of
/// `dimension` buckets with a hash-derived sign, and the result is
/// L2-normalized. Works for any script, including Hangul, since n-grams are
/// taken over chars rather than bytes.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(defaults::EMBED_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut gram = String::new();

        for token in text.split_whitespace() {
            let chars: Vec<char> = token.to_lowercase().chars().collect();
            for n in 1..=MAX_NGRAM.min(chars.len()) {
                for window in chars.windows(n) {
                    gram.clear();
                    gram.extend(window);
                    let hash = xxh3_64(gram.as_bytes());
                    let bucket = (hash % self.dimension as u64) as usize;
                    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
                    // Longer n-grams carry more context
                    vector[bucket] += sign * n as f32;
                }
            }
        }

        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Scale to unit length in place; zero vectors are left untouched
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Pick the configured embedder. The remote provider reuses the shared HTTP client.
pub fn build_embedder(
    config: &EmbeddingConfig,
    remote: Option<Arc<OpenAiCompatClient>>,
) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Hashing => {
            info!(dimension = config.dimension, "Using hashing embedder");
            Ok(Arc::new(HashingEmbedder::new(config.dimension)))
        }
        EmbeddingProvider::Remote => {
            let client = remote.ok_or_else(|| {
                RagSessionError::invalid_config(
                    "embedding.provider = \"remote\" requires an LLM endpoint",
                )
            })?;
            info!(
                dimension = config.dimension,
                model = config.model.as_deref().unwrap_or("(llm.model)"),
                "Using remote embedder"
            );
            Ok(client)
        }
    }
}

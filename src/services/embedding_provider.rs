// src/services/embedding_provider.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider-specific errors
#[derive(Debug, Error, Clone)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("No embedding returned")]
    NoEmbedding,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers (OpenAI, compatible gateways, etc.)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for the given text content
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible embedding endpoint
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddingProvider {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: content,
        };

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Http(format!("{}: {}", status, message)));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbeddingError::NoEmbedding)
    }
}

/// Mock provider for testing
pub struct MockProvider {
    pub response: Result<Vec<f32>, EmbeddingError>,
    pub call_count: std::sync::Arc<std::sync::Mutex<usize>>,
}

impl MockProvider {
    /// Create a mock provider that returns a successful embedding
    pub fn new_success(embedding: Vec<f32>) -> Self {
        Self {
            response: Ok(embedding),
            call_count: std::sync::Arc::new(std::sync::Mutex::new(0)),
        }
    }

    /// Create a mock provider that returns an error
    pub fn new_error(error: EmbeddingError) -> Self {
        Self {
            response: Err(error),
            call_count: std::sync::Arc::new(std::sync::Mutex::new(0)),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn generate_embedding(&self, _content: &str) -> Result<Vec<f32>, EmbeddingError> {
        *self.call_count.lock().unwrap() += 1;
        // Clone the result to allow multiple calls
        match &self.response {
            Ok(vec) => Ok(vec.clone()),
            Err(err) => Err(err.clone()),
        }
    }
}

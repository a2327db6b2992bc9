//! Embedders turn text into vectors for the document store.
//!
//! `ProviderEmbedder` calls the language model's `/embeddings` endpoint.
//! `DisabledEmbedder` stands in when no credentials are configured; every
//! call reports the store as not configured.

use std::sync::Arc;

use async_trait::async_trait;
use carwise_core::error::{ProviderError, StoreError};
use carwise_core::provider::{EmbeddingRequest, Provider};

/// Inputs per embedding request.
const BATCH_SIZE: usize = 64;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;
}

/// Embeddings through an OpenAI-compatible provider.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// Connectivity and credential problems mean the store cannot serve queries.
/// Only connectivity problems may clear up on their own.
fn map_provider_error(err: ProviderError) -> StoreError {
    match err {
        ProviderError::Network(_) | ProviderError::Timeout(_) | ProviderError::RateLimited { .. } => {
            StoreError::Unavailable(err.to_string())
        }
        ProviderError::NotConfigured(_) | ProviderError::AuthenticationFailed(_) => {
            StoreError::NotConfigured(err.to_string())
        }
        other => StoreError::EmbeddingFailed(other.to_string()),
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            let response = self
                .provider
                .embed(EmbeddingRequest {
                    model: self.model.clone(),
                    inputs: batch.to_vec(),
                })
                .await
                .map_err(map_provider_error)?;

            if response.embeddings.len() != batch.len() {
                return Err(StoreError::EmbeddingFailed(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            vectors.extend(response.embeddings);
        }
        Ok(vectors)
    }
}

/// Placeholder used when embeddings cannot be produced.
pub struct DisabledEmbedder {
    reason: String,
}

impl DisabledEmbedder {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        Err(StoreError::NotConfigured(self.reason.clone()))
    }
}

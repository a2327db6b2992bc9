//! Provider retry wrapper: exponential backoff on transient failures.
//!
//! Wraps any provider. Rate limits, timeouts, network errors and 5xx responses
//! are retried per the configured `RetryPolicy`; everything else fails fast.

use async_trait::async_trait;
use carwise_core::error::ProviderError;
use carwise_core::provider::*;
use carwise_core::retry::RetryPolicy;
use std::sync::Arc;
use tracing::debug;

/// A provider that retries its inner provider on transient errors.
pub struct RetryingProvider {
    inner: Arc<dyn carwise_core::Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn carwise_core::Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl carwise_core::Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.inner.name(), attempts = self.policy.attempts, "Completion with retry");
        self.policy
            .run("complete", ProviderError::is_transient, || {
                self.inner.complete(request.clone())
            })
            .await
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        self.policy
            .run("embed", ProviderError::is_transient, || {
                self.inner.embed(request.clone())
            })
            .await
    }
}

//! Provider construction from configuration.

use std::sync::Arc;
use std::time::Duration;
use carwise_config::{AppConfig, RetryConfig};
use carwise_core::error::ProviderError;
use carwise_core::provider::Provider;
use carwise_core::retry::RetryPolicy;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::RetryingProvider;

/// Retry policy described by the `[retry]` config section.
pub fn retry_policy(config: &RetryConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.attempts,
        Duration::from_millis(config.wait_min_ms),
        Duration::from_millis(config.wait_max_ms),
    )
}

/// Build the chat/embedding provider from configuration.
///
/// Fails with `NotConfigured` when no API key is available. The result is
/// wrapped in a `RetryingProvider` using the `[retry]` settings.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(
            "No API key. Set OPENAI_API_KEY or api_key in ~/.carwise/config.toml".into(),
        )
    })?;

    // Per attempt; a timed-out attempt is retried and the orchestrator allows
    // for all of them
    let inner = OpenAiCompatProvider::new(
        provider_name(&config.base_url),
        &config.base_url,
        api_key,
        config.orchestrator.request_timeout(),
    )?;

    Ok(Arc::new(RetryingProvider::new(
        Arc::new(inner),
        retry_policy(&config.retry),
    )))
}

/// A short name for log lines, derived from the endpoint host.
fn provider_name(base_url: &str) -> &'static str {
    if base_url.contains("api.openai.com") {
        "openai"
    } else if base_url.contains("openrouter.ai") {
        "openrouter"
    } else if base_url.contains("localhost") || base_url.contains("127.0.0.1") {
        "local"
    } else {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let config = AppConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn build_with_key() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn provider_names() {
        assert_eq!(provider_name("https://api.openai.com/v1"), "openai");
        assert_eq!(provider_name("http://localhost:11434/v1"), "local");
        assert_eq!(provider_name("https://llm.internal/v1"), "openai-compatible");
    }

    #[test]
    fn retry_policy_from_config() {
        let policy = retry_policy(&RetryConfig::default());
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.wait_min, Duration::from_secs(1));
        assert_eq!(policy.wait_max, Duration::from_secs(10));
    }
}

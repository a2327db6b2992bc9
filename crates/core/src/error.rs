//! Error types for the Carwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `TierError` is the taxonomy
//! the fallback orchestrator reasons about, and every other enum converts
//! into it.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Network hiccups, timeouts, rate limits and 5xx responses are transient;
    /// auth and configuration problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store cannot be reached right now (embedding service down, unreadable file).
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    /// The store cannot work at all with the current settings (no embedding credentials).
    #[error("Document store not configured: {0}")]
    NotConfigured(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool disabled: {tool_name} ({reason})")]
    Disabled { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// Retryable transport failure. The adapter never retries on its own.
    #[error("Network error in {tool_name}: {reason}")]
    Network { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl StoreError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl ToolError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

/// Failure of one tier of the fallback chain.
///
/// Everything except `ModelUnavailable` is recovered by moving on to the
/// next tier; `ModelUnavailable` is the only error `respond` hands back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierError {
    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("no tools available: {0}")]
    ToolDisabled(String),

    #[error("tool call failed: {0}")]
    ToolCallError(String),

    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("tool round limit of {limit} exceeded")]
    RoundLimitExceeded { limit: u32 },
}

impl From<StoreError> for TierError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<ToolError> for TierError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Disabled { .. } => Self::ToolDisabled(err.to_string()),
            other => Self::ToolCallError(other.to_string()),
        }
    }
}

impl From<ProviderError> for TierError {
    fn from(err: ProviderError) -> Self {
        Self::ModelUnavailable(err.to_string())
    }
}

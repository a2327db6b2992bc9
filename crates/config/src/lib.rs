//! Configuration loading, validation, and management for Carwise.
//!
//! Loads configuration from `~/.carwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.carwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the OpenAI-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Fallback chain settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Keyword routing
    #[serde(default)]
    pub router: RouterConfig,

    /// Web search tool
    #[serde(default)]
    pub search: SearchConfig,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Document store and ingestion
    #[serde(default)]
    pub store: StoreConfig,

    /// Prompts and answer markers
    #[serde(default)]
    pub prompts: PromptConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("orchestrator", &self.orchestrator)
            .field("router", &self.router)
            .field("search", &self.search)
            .field("retry", &self.retry)
            .field("store", &self.store)
            .field("prompts", &self.prompts)
            .finish()
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("max_results", &self.max_results)
            .finish()
    }
}

/// Knobs of the KB → agent → direct chat fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Minimum chunk score for the knowledge base answer to be accepted
    #[serde(default = "default_kb_relevance_threshold")]
    pub kb_relevance_threshold: f32,

    /// Chunks requested from the store per query
    #[serde(default = "default_kb_top_k")]
    pub kb_top_k: usize,

    /// Maximum tool-calling rounds in an agent attempt
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Exchanges (user + assistant pairs) kept in conversation memory
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,

    /// Timeout applied to every external call, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Offer the document store to the agent as a callable tool
    #[serde(default = "default_true")]
    pub store_as_tool: bool,

    /// Characters of tool output kept in each reasoning step
    #[serde(default = "default_reasoning_output_chars")]
    pub reasoning_output_chars: usize,
}

fn default_kb_relevance_threshold() -> f32 {
    0.35
}
fn default_kb_top_k() -> usize {
    4
}
fn default_max_tool_rounds() -> u32 {
    3
}
fn default_memory_window() -> usize {
    5
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_reasoning_output_chars() -> usize {
    300
}
fn default_true() -> bool {
    true
}

impl OrchestratorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            kb_relevance_threshold: default_kb_relevance_threshold(),
            kb_top_k: default_kb_top_k(),
            max_tool_rounds: default_max_tool_rounds(),
            memory_window: default_memory_window(),
            request_timeout_secs: default_request_timeout_secs(),
            store_as_tool: true,
            reasoning_output_chars: default_reasoning_output_chars(),
        }
    }
}

/// Keyword lists used by the query router. Matching is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Terms that force the agent path (recency / news intent)
    #[serde(default = "default_news_keywords")]
    pub news_keywords: Vec<String>,
}

fn default_news_keywords() -> Vec<String> {
    [
        "tin tức", "mới nhất", "gần đây", "hiện nay", "cập nhật", "ra mắt",
        "news", "latest", "recent", "current", "update", "breaking",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            news_keywords: default_news_keywords(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search backend ("tavily")
    #[serde(default = "default_search_provider")]
    pub provider: String,

    /// Without a key the web search tool is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_url")]
    pub api_url: String,

    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_search_provider() -> String {
    "tavily".into()
}
fn default_search_url() -> String {
    "https://api.tavily.com".into()
}
fn default_max_results() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key: None,
            api_url: default_search_url(),
            max_results: default_max_results(),
        }
    }
}

/// Exponential backoff for transient model and network errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,

    #[serde(default = "default_wait_min_ms")]
    pub wait_min_ms: u64,

    #[serde(default = "default_wait_max_ms")]
    pub wait_max_ms: u64,
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_wait_min_ms() -> u64 {
    1000
}
fn default_wait_max_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            wait_min_ms: default_wait_min_ms(),
            wait_max_ms: default_wait_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSONL file holding embedded chunks. Defaults to `~/.carwise/knowledge.jsonl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("knowledge.jsonl"))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            embedding_model: default_embedding_model(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// System prompt for every tier
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Instructions appended when answering from retrieved chunks
    #[serde(default = "default_kb_instructions")]
    pub kb_instructions: String,

    /// Phrase the model uses when the context has no answer. Empty disables the check.
    #[serde(default = "default_no_info_marker")]
    pub no_info_marker: String,

    /// Shown to the user when no tier could answer
    #[serde(default = "default_apology")]
    pub apology: String,
}

fn default_system_prompt() -> String {
    "Bạn là một chuyên gia tư vấn ô tô chuyên nghiệp và thân thiện.\n\n\
     Hãy trả lời các câu hỏi về:\n\
     - Thông tin xe hơi, công nghệ ô tô\n\
     - Tư vấn mua xe, so sánh xe\n\
     - Bảo dưỡng và sửa chữa xe\n\
     - Lái xe an toàn\n\
     - Xu hướng ngành ô tô\n\n\
     Trả lời bằng tiếng Việt một cách tự nhiên, chi tiết và hữu ích."
        .into()
}
fn default_kb_instructions() -> String {
    "Sử dụng thông tin từ context để đưa ra câu trả lời chính xác. \
     Nếu context không chứa câu trả lời, hãy trả lời đúng cụm từ \"KHÔNG TÌM THẤY THÔNG TIN\"."
        .into()
}
fn default_no_info_marker() -> String {
    "KHÔNG TÌM THẤY THÔNG TIN".into()
}
fn default_apology() -> String {
    "Xin lỗi, tôi đang gặp sự cố kỹ thuật. Vui lòng thử lại sau.".into()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            kb_instructions: default_kb_instructions(),
            no_info_marker: default_no_info_marker(),
            apology: default_apology(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.carwise/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides.
    ///
    /// - `CARWISE_API_KEY`, then `OPENAI_API_KEY` (only if no key in the file)
    /// - `OPENAI_BASE_URL`, `MODEL_NAME`, `MAX_TOKENS`, `TEMPERATURE`
    /// - `TAVILY_API_KEY`
    /// - `RETRY_ATTEMPTS`, `RETRY_WAIT_MIN`, `RETRY_WAIT_MAX` (seconds)
    /// - `CARWISE_STORE_PATH`
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = env("CARWISE_API_KEY").or_else(|| env("OPENAI_API_KEY"));
        }
        if let Some(url) = env("OPENAI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = env("MODEL_NAME") {
            self.default_model = model;
        }
        if let Some(v) = env("MAX_TOKENS") {
            self.default_max_tokens = parse_env("MAX_TOKENS", &v)?;
        }
        if let Some(v) = env("TEMPERATURE") {
            self.default_temperature = parse_env("TEMPERATURE", &v)?;
        }
        if self.search.api_key.is_none() {
            self.search.api_key = env("TAVILY_API_KEY");
        }
        if let Some(v) = env("RETRY_ATTEMPTS") {
            self.retry.attempts = parse_env("RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = env("RETRY_WAIT_MIN") {
            self.retry.wait_min_ms = parse_env::<u64>("RETRY_WAIT_MIN", &v)? * 1000;
        }
        if let Some(v) = env("RETRY_WAIT_MAX") {
            self.retry.wait_max_ms = parse_env::<u64>("RETRY_WAIT_MAX", &v)? * 1000;
        }
        if let Some(path) = env("CARWISE_STORE_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".carwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let o = &self.orchestrator;
        if !(0.0..=1.0).contains(&o.kb_relevance_threshold) {
            return Err(ConfigError::ValidationError(
                "orchestrator.kb_relevance_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if o.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_tool_rounds must be at least 1".into(),
            ));
        }
        if o.memory_window == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.memory_window must be at least 1".into(),
            ));
        }
        if o.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.request_timeout_secs must be at least 1".into(),
            ));
        }

        if self.retry.attempts == 0 {
            return Err(ConfigError::ValidationError("retry.attempts must be at least 1".into()));
        }
        if self.retry.wait_min_ms > self.retry.wait_max_ms {
            return Err(ConfigError::ValidationError(
                "retry.wait_min_ms must not exceed retry.wait_max_ms".into(),
            ));
        }

        if self.store.chunk_size == 0 || self.store.chunk_overlap >= self.store.chunk_size {
            return Err(ConfigError::ValidationError(
                "store.chunk_overlap must be smaller than a non-zero store.chunk_size".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            orchestrator: OrchestratorConfig::default(),
            router: RouterConfig::default(),
            search: SearchConfig::default(),
            retry: RetryConfig::default(),
            store: StoreConfig::default(),
            prompts: PromptConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("environment variable {key} has invalid value '{value}'"))
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

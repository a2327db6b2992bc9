//! Web search tool for live automotive news.
//!
//! The tool is disabled at construction when no search credential is
//! configured. Callers check `is_enabled()` before registering it; a disabled
//! tool refuses every call with `ToolError::Disabled`.

use std::sync::Arc;
use std::time::Duration;

use carwise_config::SearchConfig;
use carwise_core::error::ToolError;
use carwise_core::provider::ToolDefinition;
use carwise_core::search::{WebSearchBackend, WebSearchResult};
use carwise_core::tool::{ToolCall, ToolResult};
use tracing::{info, warn};

use crate::tavily::TavilyClient;

pub const NAME: &str = "web_search";

/// Prefix that keeps generic queries on automotive topics.
const QUERY_FOCUS: &str = "Latest automotive news about: ";

#[derive(Clone)]
pub struct WebSearchTool {
    backend: Option<Arc<dyn WebSearchBackend>>,
    disabled_reason: Option<String>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn WebSearchBackend>, max_results: usize) -> Self {
        Self {
            backend: Some(backend),
            disabled_reason: None,
            max_results: max_results.max(1),
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            backend: None,
            disabled_reason: Some(reason.into()),
            max_results: 0,
        }
    }

    /// Build from the `[search]` config section.
    pub fn from_config(config: &SearchConfig, timeout: Duration) -> Self {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            info!("Web search disabled: no API key configured");
            return Self::disabled("no search API key configured (set TAVILY_API_KEY)");
        };

        if config.provider != "tavily" {
            warn!(provider = %config.provider, "Unknown search provider, web search disabled");
            return Self::disabled(format!("unsupported search provider '{}'", config.provider));
        }

        match TavilyClient::new(api_key, &config.api_url, timeout) {
            Ok(client) => Self::new(Arc::new(client), config.max_results),
            Err(e) => Self::disabled(e.to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_reason.as_deref()
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.into(),
            description: "Search the web for the latest automotive news, launches, prices and \
                          market updates. Use for anything time-sensitive."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    /// Run one search. Network failures surface as `ToolError::Network`.
    pub async fn search(&self, query: &str) -> Result<Vec<WebSearchResult>, ToolError> {
        let backend = self.backend.as_ref().ok_or_else(|| ToolError::Disabled {
            tool_name: NAME.into(),
            reason: self.disabled_reason.clone().unwrap_or_default(),
        })?;
        backend.search(&format!("{QUERY_FOCUS}{query}"), self.max_results).await
    }

    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let query = call.str_arg("query")?;
        let results = self.search(query).await?;
        Ok(ToolResult {
            call_id: call.id.clone(),
            success: true,
            output: format_results(query, &results),
            data: serde_json::to_value(&results).ok(),
        })
    }
}

fn format_results(query: &str, results: &[WebSearchResult]) -> String {
    if results.is_empty() {
        return format!("No results found for: {query}");
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.snippet, r.url))
        .collect::<Vec<_>>()
        .join("\n\n")
}

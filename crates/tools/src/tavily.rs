//! Tavily search API client.
//!
//! `POST {api_url}/search` with the API key in the body. Transport failures,
//! rate limits and 5xx responses come back as `ToolError::Network` so callers
//! can decide whether to retry; this client never retries on its own.

use std::time::Duration;

use async_trait::async_trait;
use carwise_core::error::ToolError;
use carwise_core::search::{WebSearchBackend, WebSearchResult};
use carwise_core::text::truncate_chars;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Characters of article content kept per result.
const SNIPPET_CHARS: usize = 300;

const TOOL_NAME: &str = "web_search";

pub struct TavilyClient {
    api_key: String,
    api_url: String,
    client: reqwest::Client,
}

impl TavilyClient {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("carwise/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("HTTP client: {e}"),
            })?;

        Ok(Self {
            api_key: api_key.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn network(reason: impl Into<String>) -> ToolError {
        ToolError::Network {
            tool_name: TOOL_NAME.into(),
            reason: reason.into(),
        }
    }

    fn into_results(response: TavilyResponse, max_results: usize) -> Vec<WebSearchResult> {
        response
            .results
            .into_iter()
            .filter(|r| !r.title.trim().is_empty() && !r.url.trim().is_empty())
            .take(max_results)
            .map(|r| WebSearchResult {
                title: r.title.trim().to_string(),
                snippet: truncate_chars(r.content.trim(), SNIPPET_CHARS),
                url: r.url.trim().to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl WebSearchBackend for TavilyClient {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSearchResult>, ToolError> {
        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth: "basic",
        };

        debug!(query, max_results, "Tavily search");

        let response = self
            .client
            .post(format!("{}/search", self.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::network(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            429 | 500..=599 => {
                let text = response.text().await.unwrap_or_default();
                return Err(Self::network(format!("HTTP {status}: {text}")));
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                return Err(ToolError::ExecutionFailed {
                    tool_name: TOOL_NAME.into(),
                    reason: format!("HTTP {status}: {text}"),
                });
            }
        }

        let parsed: TavilyResponse = response.json().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: format!("Failed to parse search response: {e}"),
        })?;

        Ok(Self::into_results(parsed, max_results))
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

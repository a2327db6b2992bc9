//! Web search backend trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ToolError;

/// One hit from a web search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// A hosted search API. Implementations do not retry on their own;
/// transport failures surface as `ToolError::Network`.
#[async_trait]
pub trait WebSearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> std::result::Result<Vec<WebSearchResult>, ToolError>;
}

//! Agent tools for Carwise.
//!
//! The tool set is closed: the knowledge base search and the web search.
//! `ToolBox` holds whichever of them are enabled for a request and runs
//! calls under a per-attempt timeout and the shared retry policy.

pub mod document_store;
pub mod tavily;
pub mod web_search;

use std::time::Duration;

use carwise_core::error::ToolError;
use carwise_core::provider::ToolDefinition;
use carwise_core::retry::RetryPolicy;
use carwise_core::tool::{ToolCall, ToolResult};
use tracing::debug;

pub use document_store::DocumentStoreTool;
pub use tavily::TavilyClient;
pub use web_search::WebSearchTool;

/// One of the tools the agent tier can call.
#[derive(Clone)]
pub enum AgentTool {
    DocumentStore(DocumentStoreTool),
    WebSearch(WebSearchTool),
}

impl AgentTool {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DocumentStore(_) => document_store::NAME,
            Self::WebSearch(_) => web_search::NAME,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        match self {
            Self::DocumentStore(t) => t.definition(),
            Self::WebSearch(t) => t.definition(),
        }
    }

    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        match self {
            Self::DocumentStore(t) => t.execute(call).await,
            Self::WebSearch(t) => t.execute(call).await,
        }
    }
}

/// The tools enabled for one agent run.
#[derive(Clone)]
pub struct ToolBox {
    tools: Vec<AgentTool>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl ToolBox {
    pub fn new(retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            tools: Vec::new(),
            retry,
            call_timeout,
        }
    }

    /// Add a tool. A second tool with the same name replaces the first.
    pub fn register(&mut self, tool: AgentTool) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(AgentTool::name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&AgentTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(AgentTool::definition).collect()
    }

    /// Run one tool call. Transient failures are retried with backoff; each
    /// attempt is bounded by the call timeout.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        debug!(tool = tool.name(), call_id = %call.id, "Executing tool");

        self.retry
            .run(tool.name(), ToolError::is_transient, || async {
                tokio::time::timeout(self.call_timeout, tool.execute(call))
                    .await
                    .map_err(|_| ToolError::Timeout {
                        tool_name: tool.name().into(),
                        timeout_secs: self.call_timeout.as_secs(),
                    })?
            })
            .await
    }
}

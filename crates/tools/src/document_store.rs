//! Knowledge base search exposed as an agent tool.

use std::sync::Arc;

use carwise_core::error::{StoreError, ToolError};
use carwise_core::provider::ToolDefinition;
use carwise_core::store::{DocumentStore, RetrievedChunk};
use carwise_core::tool::{ToolCall, ToolResult};

pub const NAME: &str = "knowledge_base_search";

#[derive(Clone)]
pub struct DocumentStoreTool {
    store: Arc<dyn DocumentStore>,
    top_k: usize,
}

impl DocumentStoreTool {
    pub fn new(store: Arc<dyn DocumentStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.into(),
            description: "Search the local automotive knowledge base (uploaded specs, manuals, \
                          buying guides). Returns the most relevant passages with their sources."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look up"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let query = call.str_arg("query")?;
        let chunks = self.store.search(query, self.top_k).await.map_err(store_error)?;

        Ok(ToolResult {
            call_id: call.id.clone(),
            success: true,
            output: format_chunks(&chunks),
            data: serde_json::to_value(&chunks).ok(),
        })
    }
}

/// Only connectivity failures are worth another attempt.
fn store_error(err: StoreError) -> ToolError {
    match err {
        StoreError::Unavailable(reason) => ToolError::Network {
            tool_name: NAME.into(),
            reason,
        },
        other => ToolError::ExecutionFailed {
            tool_name: NAME.into(),
            reason: other.to_string(),
        },
    }
}

fn format_chunks(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return "No matching documents in the knowledge base.".into();
    }
    chunks
        .iter()
        .map(|c| format!("[{}] (score {:.2})\n{}", c.source, c.score, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carwise_core::store::ChunkRecord;

    struct FixedStore {
        result: Result<Vec<RetrievedChunk>, StoreError>,
    }

    #[async_trait]
    impl DocumentStore for FixedStore {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn search(&self, _q: &str, k: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
            self.result.clone().map(|mut v| {
                v.truncate(k);
                v
            })
        }
        async fn upsert(&self, chunks: Vec<ChunkRecord>) -> Result<usize, StoreError> {
            Ok(chunks.len())
        }
        async fn replace_source(&self, _source: &str, chunks: Vec<ChunkRecord>) -> Result<usize, StoreError> {
            Ok(chunks.len())
        }
        async fn count(&self) -> Result<usize, StoreError> {
            Ok(self.result.as_ref().map(|v| v.len()).unwrap_or(0))
        }
        async fn clear(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn call() -> ToolCall {
        ToolCall {
            id: "call_kb".into(),
            name: NAME.into(),
            arguments: serde_json::json!({"query": "CR-V an toàn"}),
        }
    }

    #[tokio::test]
    async fn formats_chunks_with_sources() {
        let tool = DocumentStoreTool::new(
            Arc::new(FixedStore {
                result: Ok(vec![RetrievedChunk::new("CR-V có 6 túi khí", "crv.md", 0.81)]),
            }),
            4,
        );
        let result = tool.execute(&call()).await.unwrap();
        assert!(result.output.contains("[crv.md] (score 0.81)"));
        assert!(result.output.contains("6 túi khí"));
    }

    #[tokio::test]
    async fn empty_store_is_not_an_error() {
        let tool = DocumentStoreTool::new(Arc::new(FixedStore { result: Ok(vec![]) }), 4);
        let result = tool.execute(&call()).await.unwrap();
        assert!(result.output.contains("No matching documents"));
    }

    #[tokio::test]
    async fn unavailable_store_is_transient_tool_error() {
        let tool = DocumentStoreTool::new(
            Arc::new(FixedStore { result: Err(StoreError::Unavailable("down".into())) }),
            4,
        );
        let err = tool.execute(&call()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn unconfigured_store_is_not_retried() {
        let tool = DocumentStoreTool::new(
            Arc::new(FixedStore {
                result: Err(StoreError::NotConfigured("no API key configured".into())),
            }),
            4,
        );
        let err = tool.execute(&call()).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("no API key"));
    }
}

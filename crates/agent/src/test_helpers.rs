//! Scripted providers, stores and search backends for agent tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use carwise_core::error::{ProviderError, StoreError, ToolError};
use carwise_core::message::{Message, MessageToolCall};
use carwise_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use carwise_core::search::{WebSearchBackend, WebSearchResult};
use carwise_core::store::{ChunkRecord, DocumentStore, RetrievedChunk};

enum Script {
    Sequence(Vec<ProviderResponse>),
    Repeat(ProviderResponse),
    Fail,
}

/// A mock provider that returns scripted responses and records every request.
///
/// Panics if a sequence runs out.
pub struct SequentialMockProvider {
    script: Script,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(Script::Sequence(responses))
    }

    fn scripted(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    /// Requests the same tool on every call, forever.
    pub fn always_tool_call(call: MessageToolCall) -> Self {
        Self::scripted(Script::Repeat(make_tool_call_response(vec![call], "")))
    }

    /// Every call fails with a network error.
    pub fn failing() -> Self {
        Self::scripted(Script::Fail)
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);

        match &self.script {
            Script::Sequence(responses) => match responses.get(index) {
                Some(response) => Ok(response.clone()),
                None => panic!(
                    "SequentialMockProvider: no more responses (call #{index}, have {})",
                    responses.len()
                ),
            },
            Script::Repeat(response) => Ok(response.clone()),
            Script::Fail => Err(ProviderError::Network("connection refused".into())),
        }
    }
}

/// Never answers within any reasonable timeout.
pub struct SlowProvider(pub Duration);

#[async_trait]
impl Provider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::time::sleep(self.0).await;
        Ok(make_text_response("too late"))
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut response = make_text_response(thought);
    response.message.tool_calls = tool_calls;
    response
}

pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// Document store with fixed search results and a call counter.
pub struct SpyStore {
    chunks: Vec<RetrievedChunk>,
    unavailable: bool,
    searches: Mutex<Vec<String>>,
}

impl SpyStore {
    pub fn with_chunks(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            unavailable: false,
            searches: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::with_chunks(Vec::new())
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::empty()
        }
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for SpyStore {
    fn name(&self) -> &str {
        "spy"
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
        self.searches.lock().unwrap().push(query.to_string());
        if self.unavailable {
            return Err(StoreError::Unavailable("embeddings offline".into()));
        }
        Ok(self.chunks.iter().take(k).cloned().collect())
    }

    async fn upsert(&self, chunks: Vec<ChunkRecord>) -> Result<usize, StoreError> {
        Ok(chunks.len())
    }

    async fn replace_source(&self, _source: &str, chunks: Vec<ChunkRecord>) -> Result<usize, StoreError> {
        Ok(chunks.len())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("embeddings offline".into()));
        }
        Ok(self.chunks.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Web search backend returning canned articles.
pub struct SpySearch {
    results: usize,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl SpySearch {
    pub fn with_results(results: usize) -> Self {
        Self {
            results,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_results(0)
        }
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl WebSearchBackend for SpySearch {
    fn name(&self) -> &str {
        "spy"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSearchResult>, ToolError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: "HTTP 400".into(),
            });
        }
        Ok((0..self.results.min(max_results))
            .map(|i| WebSearchResult {
                title: format!("Tin xe điện số {}", i + 1),
                snippet: "Thị trường xe điện tăng trưởng mạnh".into(),
                url: format!("https://example.vn/ev/{}", i + 1),
            })
            .collect())
    }
}

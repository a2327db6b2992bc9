//! The fallback orchestrator: one user turn through the tier chain.
//!
//! ```text
//! ROUTING ─► KB_ATTEMPT ─► AGENT_ATTEMPT ─► DIRECT_CHAT ─► DONE
//!               │               │                          ▲
//!               └───────────────┴──────── answered ────────┘
//! ```
//!
//! The router picks the entry tier. Each tier either answers, or is
//! insufficient, or fails with a `TierError`; anything but an answer moves
//! forward to the next tier and no tier runs twice. Only a failure at
//! DIRECT_CHAT reaches the caller, as `TierError::ModelUnavailable`.
//!
//! A session's memory stays locked for the whole turn, so concurrent calls
//! on one session are serialised while different sessions run in parallel.

use std::sync::Arc;
use std::time::Duration;

use carwise_config::{AppConfig, OrchestratorConfig, PromptConfig};
use carwise_core::error::TierError;
use carwise_core::event::{DomainEvent, EventBus};
use carwise_core::message::{Message, Query, SessionId, TurnRole};
use carwise_core::provider::{Provider, ProviderRequest, ProviderResponse};
use carwise_core::retry::RetryPolicy;
use carwise_core::route::{RouteDecision, RoutePath};
use carwise_core::store::{DocumentStore, RetrievedChunk};
use carwise_tools::{AgentTool, DocumentStoreTool, ToolBox, WebSearchTool};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::conversation::ConversationMemory;
use crate::reasoning::ReasoningCapture;
use crate::router::QueryRouter;
use crate::session::SessionStore;
use crate::tool_loop::ToolLoop;

/// Where a turn currently is in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratorState {
    Routing,
    KbAttempt,
    AgentAttempt,
    DirectChat,
    Done,
}

impl OrchestratorState {
    /// First tier for a routed path. Routing may only skip the
    /// knowledge base for the agent; plain chat is reached by falling back.
    pub fn entry(path: RoutePath) -> Self {
        match path {
            RoutePath::Agent => Self::AgentAttempt,
            RoutePath::KnowledgeBase | RoutePath::DirectChat => Self::KbAttempt,
        }
    }

    /// Forward-only successor.
    pub fn next(self) -> Self {
        match self {
            Self::Routing => Self::KbAttempt,
            Self::KbAttempt => Self::AgentAttempt,
            Self::AgentAttempt => Self::DirectChat,
            Self::DirectChat | Self::Done => Self::Done,
        }
    }

    /// The answer path a tier state corresponds to.
    pub fn path(self) -> Option<RoutePath> {
        match self {
            Self::KbAttempt => Some(RoutePath::KnowledgeBase),
            Self::AgentAttempt => Some(RoutePath::Agent),
            Self::DirectChat => Some(RoutePath::DirectChat),
            Self::Routing | Self::Done => None,
        }
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Routing => "ROUTING",
            Self::KbAttempt => "KB_ATTEMPT",
            Self::AgentAttempt => "AGENT_ATTEMPT",
            Self::DirectChat => "DIRECT_CHAT",
            Self::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// How one tier ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOutcome {
    Answered,
    Insufficient(String),
    Failed(TierError),
}

impl TierOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::Insufficient(_) => "insufficient",
            Self::Failed(_) => "failed",
        }
    }

    pub fn error(&self) -> Option<&TierError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for TierOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Answered => f.write_str("answered"),
            Self::Insufficient(reason) => write!(f, "insufficient: {reason}"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// One tier that was tried during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierAttempt {
    pub state: OrchestratorState,
    pub outcome: TierOutcome,
}

/// What `respond` hands back.
#[derive(Debug, Clone)]
pub struct ChatReply {
    /// Reasoning block (if any) followed by the final answer
    pub answer_text: String,
    pub reasoning_text: Option<String>,
    /// The tier that produced the answer
    pub path: RoutePath,
    pub route: RouteDecision,
    /// Documents (knowledge base) or tools (agent) the answer drew on
    pub sources: Vec<String>,
    pub attempts: Vec<TierAttempt>,
    pub model: String,
}

impl ChatReply {
    pub fn recorded_error(&self, matches: impl Fn(&TierError) -> bool) -> bool {
        self.attempts
            .iter()
            .filter_map(|a| a.outcome.error())
            .any(matches)
    }
}

/// A tier's answer before it becomes a `ChatReply`.
struct TierAnswer {
    text: String,
    reasoning: Option<String>,
    sources: Vec<String>,
    model: String,
}

/// Why a tier did not answer.
enum Miss {
    Insufficient(String),
    Failed(TierError),
}

impl From<TierError> for Miss {
    fn from(err: TierError) -> Self {
        Self::Failed(err)
    }
}

type TierResult = Result<TierAnswer, Miss>;

pub struct FallbackOrchestrator {
    provider: Arc<dyn Provider>,
    store: Arc<dyn DocumentStore>,
    web_search: WebSearchTool,
    sessions: Arc<SessionStore>,
    router: QueryRouter,
    event_bus: Arc<EventBus>,
    settings: OrchestratorConfig,
    prompts: PromptConfig,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    retry: RetryPolicy,
}

impl FallbackOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn DocumentStore>,
        web_search: WebSearchTool,
        sessions: Arc<SessionStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            provider,
            store,
            web_search,
            sessions,
            router: QueryRouter::from_config(&config.router),
            event_bus: Arc::new(EventBus::default()),
            settings: config.orchestrator.clone(),
            prompts: config.prompts.clone(),
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            retry: carwise_providers::retry_policy(&config.retry),
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Retry policy for tool calls. It must match the policy the provider
    /// retries with, since model calls are given `budget` of it.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn web_search(&self) -> &WebSearchTool {
        &self.web_search
    }

    /// Message shown to the user when `respond` fails.
    pub fn apology(&self) -> &str {
        &self.prompts.apology
    }

    /// Answer one user message in the given session.
    ///
    /// The only error is `TierError::ModelUnavailable`, when even plain
    /// chat could not produce an answer. Memory is untouched in that case.
    pub async fn respond(&self, user_text: &str, session_id: &SessionId) -> Result<ChatReply, TierError> {
        let query = Query::new(user_text);
        let session = self.sessions.get_or_create(session_id).await;
        let mut memory = session.lock().await;

        let route = self.router.classify(query.text());
        info!(session_id = %session_id, path = %route.path, reason = %route.reason, "Route decided");
        self.event_bus.publish(DomainEvent::RouteDecided {
            session_id: session_id.to_string(),
            path: route.path,
            reason: route.reason.clone(),
            timestamp: chrono::Utc::now(),
        });

        let mut attempts = Vec::new();
        let mut state = OrchestratorState::entry(route.path);

        let (answered_by, answer) = loop {
            let result = match state {
                OrchestratorState::KbAttempt => self.try_knowledge_base(&query, &memory).await,
                OrchestratorState::AgentAttempt => self.try_agent(&query, &memory).await,
                _ => self.direct_chat(&query, &memory).await,
            };

            let (outcome, answer) = match result {
                Ok(answer) => (TierOutcome::Answered, Some(answer)),
                Err(Miss::Insufficient(reason)) => (TierOutcome::Insufficient(reason), None),
                Err(Miss::Failed(err)) => (TierOutcome::Failed(err), None),
            };
            self.record_tier(session_id, state, &outcome);
            attempts.push(TierAttempt {
                state,
                outcome: outcome.clone(),
            });

            if let Some(answer) = answer {
                break (state, answer);
            }

            if state == OrchestratorState::DirectChat {
                let err = match outcome {
                    TierOutcome::Failed(e) => e,
                    other => TierError::ModelUnavailable(other.to_string()),
                };
                error!(session_id = %session_id, error = %err, "All tiers failed");
                return Err(err);
            }
            state = state.next();
        };

        // DONE
        memory.add_turn(TurnRole::User, query.text());
        memory.add_turn(TurnRole::Assistant, answer.text.as_str());

        let path = answered_by.path().unwrap_or(RoutePath::DirectChat);
        self.event_bus.publish(DomainEvent::ResponseGenerated {
            session_id: session_id.to_string(),
            path,
            model: answer.model.clone(),
            timestamp: chrono::Utc::now(),
        });
        info!(
            session_id = %session_id,
            path = %path,
            tiers_tried = attempts.len(),
            "Response generated"
        );

        let answer_text = match &answer.reasoning {
            Some(reasoning) => format!("{reasoning}\n{}", answer.text),
            None => answer.text.clone(),
        };

        Ok(ChatReply {
            answer_text,
            reasoning_text: answer.reasoning,
            path,
            route,
            sources: answer.sources,
            attempts,
            model: answer.model,
        })
    }

    // ── Tiers ──

    async fn try_knowledge_base(&self, query: &Query, memory: &ConversationMemory) -> TierResult {
        let search_text = memory.contextualize(query.text());
        let timeout = self.settings.request_timeout();

        let chunks = tokio::time::timeout(timeout, self.store.search(&search_text, self.settings.kb_top_k))
            .await
            .map_err(|_| TierError::StoreUnavailable(format!("search timed out after {}s", timeout.as_secs())))?
            .map_err(TierError::from)?;

        let retrieved = chunks.len();
        let threshold = self.settings.kb_relevance_threshold;
        let relevant: Vec<RetrievedChunk> = chunks.into_iter().filter(|c| c.score >= threshold).collect();
        debug!(retrieved, relevant = relevant.len(), threshold, "Knowledge base search");

        if relevant.is_empty() {
            return Err(Miss::Insufficient(format!(
                "no chunk scored at least {threshold} ({retrieved} retrieved)"
            )));
        }

        let mut messages = memory.build_prompt_messages(&self.prompts.system_prompt);
        messages.push(Message::user(self.knowledge_prompt(query.text(), &relevant)));

        let response = match self.complete(messages).await {
            Ok(response) => response,
            Err(e) => return Err(Miss::Insufficient(format!("synthesis failed: {e}"))),
        };
        let text = response.message.content.trim().to_string();

        if text.is_empty() {
            return Err(Miss::Insufficient("empty synthesis".into()));
        }
        let marker = self.prompts.no_info_marker.trim();
        if !marker.is_empty() && text.contains(marker) {
            return Err(Miss::Insufficient("model reported no information in context".into()));
        }

        let mut sources: Vec<String> = Vec::new();
        for chunk in &relevant {
            if !sources.contains(&chunk.source) {
                sources.push(chunk.source.clone());
            }
        }

        Ok(TierAnswer {
            text,
            reasoning: None,
            sources,
            model: response.model,
        })
    }

    async fn try_agent(&self, query: &Query, memory: &ConversationMemory) -> TierResult {
        let tools = self.agent_tools().await;
        if tools.is_empty() {
            return Err(TierError::ToolDisabled(format!(
                "web search disabled ({}) and knowledge base not callable",
                self.web_search.disabled_reason().unwrap_or("unknown reason")
            ))
            .into());
        }

        let mut messages = memory.build_prompt_messages(&self.prompts.system_prompt);
        messages.push(Message::user(query.text()));

        let mut capture = ReasoningCapture::new(self.settings.reasoning_output_chars);
        let outcome = ToolLoop::new(self.provider.as_ref(), &tools, self.model.clone())
            .with_event_bus(&self.event_bus)
            .with_sampling(self.temperature, self.max_tokens)
            .with_max_rounds(self.settings.max_tool_rounds)
            .with_call_timeout(self.model_timeout())
            .run(messages, &mut capture)
            .await?;

        if outcome.final_text.is_empty() {
            return Err(Miss::Insufficient("agent produced no final answer".into()));
        }

        let trace = capture.into_trace();
        let mut sources: Vec<String> = Vec::new();
        for step in trace.steps() {
            if !sources.contains(&step.tool_name) {
                sources.push(step.tool_name.clone());
            }
        }
        let reasoning = (!trace.is_empty()).then(|| trace.render());

        Ok(TierAnswer {
            text: outcome.final_text,
            reasoning,
            sources,
            model: outcome.model,
        })
    }

    async fn direct_chat(&self, query: &Query, memory: &ConversationMemory) -> TierResult {
        let mut messages = memory.build_prompt_messages(&self.prompts.system_prompt);
        messages.push(Message::user(query.text()));

        let response = self.complete(messages).await?;
        let text = response.message.content.trim().to_string();
        if text.is_empty() {
            return Err(TierError::ModelUnavailable("empty response".into()).into());
        }

        Ok(TierAnswer {
            text,
            reasoning: None,
            sources: Vec::new(),
            model: response.model,
        })
    }

    // ── Helpers ──

    /// Tools the agent tier may call this turn. The knowledge base is only
    /// offered when it is enabled as a tool and holds at least one chunk.
    async fn agent_tools(&self) -> ToolBox {
        let mut tools = ToolBox::new(self.retry, self.settings.request_timeout());

        if self.settings.store_as_tool {
            match self.store.count().await {
                Ok(n) if n > 0 => tools.register(AgentTool::DocumentStore(DocumentStoreTool::new(
                    self.store.clone(),
                    self.settings.kb_top_k,
                ))),
                Ok(_) => debug!("Knowledge base empty, not offered as a tool"),
                Err(e) => warn!(error = %e, "Knowledge base unavailable, not offered as a tool"),
            }
        }
        if self.web_search.is_enabled() {
            tools.register(AgentTool::WebSearch(self.web_search.clone()));
        }
        tools
    }

    fn knowledge_prompt(&self, question: &str, chunks: &[RetrievedChunk]) -> String {
        let context = chunks
            .iter()
            .map(|c| format!("[{}]\n{}", c.source, c.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "{}\n\nThông tin tham khảo:\n{context}\n\nCâu hỏi: {question}",
            self.prompts.kb_instructions
        )
    }

    /// Time allowed for one logical model call: every retry attempt of
    /// `request_timeout` plus the backoff between them.
    fn model_timeout(&self) -> Duration {
        self.retry.budget(self.settings.request_timeout())
    }

    /// One tool-free model call under the model timeout.
    async fn complete(&self, messages: Vec<Message>) -> Result<ProviderResponse, TierError> {
        let mut request = ProviderRequest::new(self.model.clone(), messages);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        let timeout = self.model_timeout();
        tokio::time::timeout(timeout, self.provider.complete(request))
            .await
            .map_err(|_| TierError::ModelUnavailable(format!("no response within {}s", timeout.as_secs())))?
            .map_err(TierError::from)
    }

    fn record_tier(&self, session_id: &SessionId, state: OrchestratorState, outcome: &TierOutcome) {
        match outcome {
            TierOutcome::Answered => info!(session_id = %session_id, tier = %state, "Tier answered"),
            TierOutcome::Insufficient(reason) => {
                info!(session_id = %session_id, tier = %state, reason = %reason, "Tier insufficient, falling back")
            }
            TierOutcome::Failed(err) => {
                warn!(session_id = %session_id, tier = %state, error = %err, "Tier failed, falling back")
            }
        }

        self.event_bus.publish(DomainEvent::TierFinished {
            session_id: session_id.to_string(),
            tier: state.to_string(),
            outcome: outcome.label().into(),
            error: outcome.error().map(ToString::to_string),
            timestamp: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use carwise_core::message::Role;
    use std::time::Duration;

    fn config() -> AppConfig {
        AppConfig::default()
    }

    fn chunk(text: &str, source: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk::new(text, source, score)
    }

    fn orchestrator(
        provider: Arc<SequentialMockProvider>,
        store: Arc<SpyStore>,
        search: Option<Arc<SpySearch>>,
    ) -> FallbackOrchestrator {
        let web = match search {
            Some(s) => WebSearchTool::new(s, 3),
            None => WebSearchTool::disabled("no key"),
        };
        FallbackOrchestrator::new(provider, store, web, Arc::new(SessionStore::new(5)), &config())
            .with_retry(RetryPolicy::none())
    }

    #[test]
    fn states_only_move_forward() {
        assert_eq!(OrchestratorState::Routing.next(), OrchestratorState::KbAttempt);
        assert_eq!(OrchestratorState::KbAttempt.next(), OrchestratorState::AgentAttempt);
        assert_eq!(OrchestratorState::AgentAttempt.next(), OrchestratorState::DirectChat);
        assert_eq!(OrchestratorState::DirectChat.next(), OrchestratorState::Done);
        assert_eq!(OrchestratorState::Done.next(), OrchestratorState::Done);
        assert_eq!(OrchestratorState::KbAttempt.to_string(), "KB_ATTEMPT");
    }

    #[tokio::test]
    async fn relevant_chunk_answers_from_knowledge_base() {
        let provider = Arc::new(SequentialMockProvider::single_text("CR-V có 6 túi khí."));
        let store = Arc::new(SpyStore::with_chunks(vec![chunk("Honda CR-V: 6 túi khí", "crv.md", 0.82)]));
        let search = Arc::new(SpySearch::with_results(3));
        let orch = orchestrator(provider.clone(), store.clone(), Some(search.clone()));

        let reply = orch.respond("CR-V có mấy túi khí?", &SessionId::from("s")).await.unwrap();

        assert_eq!(reply.path, RoutePath::KnowledgeBase);
        assert_eq!(reply.answer_text, "CR-V có 6 túi khí.");
        assert_eq!(reply.sources, vec!["crv.md"]);
        assert!(reply.reasoning_text.is_none());
        assert_eq!(search.call_count(), 0);
        assert_eq!(reply.attempts.len(), 1);

        // The chunk text reached the model
        let request = &provider.requests()[0];
        assert!(request.tools.is_empty());
        assert!(request.messages.last().unwrap().content.contains("6 túi khí"));
    }

    #[tokio::test]
    async fn no_info_marker_falls_through() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("KHÔNG TÌM THẤY THÔNG TIN"),
            make_text_response("Theo hiểu biết chung, ..."),
        ]));
        let store = Arc::new(SpyStore::with_chunks(vec![chunk("Mazda CX-5 specs", "cx5.md", 0.9)]));
        let mut settings = config().orchestrator;
        settings.store_as_tool = false;
        let orch = orchestrator(provider, store, None).with_settings(settings);

        let reply = orch.respond("Giá lăn bánh CX-5?", &SessionId::from("s")).await.unwrap();
        assert_eq!(reply.path, RoutePath::DirectChat);
        assert_eq!(
            reply.attempts[0].outcome,
            TierOutcome::Insufficient("model reported no information in context".into())
        );
        assert!(reply.recorded_error(|e| matches!(e, TierError::ToolDisabled(_))));
    }

    #[tokio::test]
    async fn store_unavailable_moves_on() {
        let provider = Arc::new(SequentialMockProvider::single_text("Câu trả lời chung"));
        let orch = orchestrator(provider, Arc::new(SpyStore::unavailable()), None);

        let reply = orch.respond("Xe nào bền nhất?", &SessionId::from("s")).await.unwrap();
        assert_eq!(reply.path, RoutePath::DirectChat);
        assert!(reply.recorded_error(|e| matches!(e, TierError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn news_query_skips_store() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("web_search", serde_json::json!({"query": "xe điện"}))],
            "",
            "Thị trường xe điện đang tăng trưởng.",
        ));
        let store = Arc::new(SpyStore::with_chunks(vec![chunk("old", "a.md", 0.9)]));
        let orch = orchestrator(provider, store.clone(), Some(Arc::new(SpySearch::with_results(2))));

        let reply = orch.respond("tin tức xe điện", &SessionId::from("s")).await.unwrap();
        assert_eq!(reply.route.path, RoutePath::Agent);
        assert_eq!(reply.path, RoutePath::Agent);
        assert_eq!(store.search_count(), 0);
        assert_eq!(reply.sources, vec!["web_search"]);
    }

    #[tokio::test]
    async fn agent_answer_includes_reasoning_then_text() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("web_search", serde_json::json!({"query": "VF3"}))],
            "Tìm tin mới",
            "VF3 giá 240 triệu.",
        ));
        let orch = orchestrator(provider, Arc::new(SpyStore::empty()), Some(Arc::new(SpySearch::with_results(1))));

        let reply = orch.respond("giá VF3 mới nhất", &SessionId::from("s")).await.unwrap();
        let reasoning = reply.reasoning_text.clone().unwrap();
        assert!(reasoning.contains("web_search"));
        assert!(reply.answer_text.starts_with(&reasoning));
        assert!(reply.answer_text.ends_with("VF3 giá 240 triệu."));

        // Memory keeps the answer, not the reasoning
        let memory = orch.sessions().get(&SessionId::from("s")).await.unwrap();
        let memory = memory.lock().await;
        assert_eq!(memory.turns().last().unwrap().content, "VF3 giá 240 triệu.");
    }

    #[tokio::test]
    async fn store_offered_as_tool_when_populated() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("unused"),
        ]));
        let store = Arc::new(SpyStore::with_chunks(vec![chunk("x", "a.md", 0.1)]));
        let orch = orchestrator(provider.clone(), store, None);

        let tools = orch.agent_tools().await;
        assert_eq!(tools.names(), vec!["knowledge_base_search"]);

        let empty = orchestrator(provider, Arc::new(SpyStore::empty()), None);
        assert!(empty.agent_tools().await.is_empty());
    }

    #[tokio::test]
    async fn direct_chat_failure_is_model_unavailable() {
        let provider = Arc::new(SequentialMockProvider::failing());
        let orch = orchestrator(provider, Arc::new(SpyStore::empty()), None);
        let session = SessionId::from("s");

        let err = orch.respond("xin chào", &session).await.unwrap_err();
        assert!(matches!(err, TierError::ModelUnavailable(_)));

        let memory = orch.sessions().get(&session).await.unwrap();
        assert!(memory.lock().await.is_empty());
        assert!(!orch.apology().is_empty());
    }

    #[tokio::test]
    async fn greeting_prefixed_question_reaches_the_store() {
        let provider = Arc::new(SequentialMockProvider::single_text("CR-V có 6 túi khí."));
        let store = Arc::new(SpyStore::with_chunks(vec![chunk("Honda CR-V: 6 túi khí", "crv.md", 0.9)]));
        let orch = orchestrator(provider, store.clone(), None);

        let reply = orch.respond("hello, CR-V có mấy túi khí?", &SessionId::from("s")).await.unwrap();
        assert_eq!(reply.route.path, RoutePath::KnowledgeBase);
        assert_eq!(reply.path, RoutePath::KnowledgeBase);
        assert_eq!(store.search_count(), 1);
        assert_eq!(reply.sources, vec!["crv.md"]);
    }

    #[test]
    fn routing_never_enters_direct_chat() {
        assert_eq!(OrchestratorState::entry(RoutePath::Agent), OrchestratorState::AgentAttempt);
        assert_eq!(OrchestratorState::entry(RoutePath::KnowledgeBase), OrchestratorState::KbAttempt);
        assert_eq!(OrchestratorState::entry(RoutePath::DirectChat), OrchestratorState::KbAttempt);
    }

    #[tokio::test]
    async fn history_reaches_the_model() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("Camry là sedan."),
            make_text_response("Khoảng 1,1 tỷ."),
        ]));
        let orch = orchestrator(provider.clone(), Arc::new(SpyStore::empty()), None);
        let session = SessionId::from("s");

        orch.respond("Toyota Camry là xe gì?", &session).await.unwrap();
        orch.respond("Nó giá bao nhiêu?", &session).await.unwrap();

        let second = &provider.requests()[1];
        let roles: Vec<Role> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(second.messages[1].content, "Toyota Camry là xe gì?");
    }

    #[tokio::test]
    async fn referential_query_is_contextualized_for_search() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("Camry là sedan."),
            make_text_response("Khoảng 1,1 tỷ."),
        ]));
        let store = Arc::new(SpyStore::empty());
        let orch = orchestrator(provider, store.clone(), None);
        let session = SessionId::from("s");

        orch.respond("Toyota Camry là xe gì?", &session).await.unwrap();
        orch.respond("Nó giá bao nhiêu?", &session).await.unwrap();

        let queries = store.queries();
        assert!(queries[1].contains("Toyota"));
    }

    #[tokio::test]
    async fn events_trace_the_turn() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let orch = orchestrator(provider, Arc::new(SpyStore::empty()), None);
        let mut rx = orch.event_bus().subscribe();

        orch.respond("Xe gia đình 7 chỗ?", &SessionId::from("s")).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match &*event {
                DomainEvent::RouteDecided { .. } => "route".to_string(),
                DomainEvent::TierFinished { tier, outcome, .. } => format!("{tier}:{outcome}"),
                DomainEvent::ToolExecuted { .. } => "tool".to_string(),
                DomainEvent::ResponseGenerated { .. } => "done".to_string(),
            });
        }
        assert_eq!(
            kinds,
            vec![
                "route",
                "KB_ATTEMPT:insufficient",
                "AGENT_ATTEMPT:failed",
                "DIRECT_CHAT:answered",
                "done"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_model_attempt_is_retried() {
        use carwise_core::error::ProviderError;
        use std::sync::atomic::{AtomicU32, Ordering};

        /// First attempt hangs until its HTTP timeout, the second answers.
        struct SlowOnce {
            calls: AtomicU32,
            per_attempt: Duration,
        }

        #[async_trait::async_trait]
        impl Provider for SlowOnce {
            fn name(&self) -> &str {
                "slow_once"
            }
            async fn complete(&self, _r: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(self.per_attempt).await;
                    return Err(ProviderError::Timeout("HTTP request timed out".into()));
                }
                Ok(make_text_response("Xe 7 chỗ phổ biến: Xpander, Innova."))
            }
        }

        let config = config();
        let policy = carwise_providers::retry_policy(&config.retry);
        let inner = Arc::new(SlowOnce {
            calls: AtomicU32::new(0),
            per_attempt: config.orchestrator.request_timeout(),
        });
        let provider = Arc::new(carwise_providers::RetryingProvider::new(inner.clone(), policy));
        let orch = FallbackOrchestrator::new(
            provider,
            Arc::new(SpyStore::empty()),
            WebSearchTool::disabled("no key"),
            Arc::new(SessionStore::default()),
            &config,
        )
        .with_retry(policy);

        let reply = orch.respond("Xe gia đình 7 chỗ?", &SessionId::from("s")).await.unwrap();
        assert_eq!(reply.path, RoutePath::DirectChat);
        assert_eq!(reply.answer_text, "Xe 7 chỗ phổ biến: Xpander, Innova.");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_counts_as_unavailable() {
        struct HangingStore;

        #[async_trait::async_trait]
        impl DocumentStore for HangingStore {
            fn name(&self) -> &str {
                "hanging"
            }
            async fn search(&self, _q: &str, _k: usize) -> Result<Vec<RetrievedChunk>, carwise_core::error::StoreError> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(vec![])
            }
            async fn upsert(&self, c: Vec<carwise_core::store::ChunkRecord>) -> Result<usize, carwise_core::error::StoreError> {
                Ok(c.len())
            }
            async fn replace_source(
                &self,
                _s: &str,
                c: Vec<carwise_core::store::ChunkRecord>,
            ) -> Result<usize, carwise_core::error::StoreError> {
                Ok(c.len())
            }
            async fn count(&self) -> Result<usize, carwise_core::error::StoreError> {
                Ok(0)
            }
            async fn clear(&self) -> Result<(), carwise_core::error::StoreError> {
                Ok(())
            }
        }

        let provider = Arc::new(SequentialMockProvider::single_text("fallback"));
        let orch = FallbackOrchestrator::new(
            provider,
            Arc::new(HangingStore),
            WebSearchTool::disabled("no key"),
            Arc::new(SessionStore::default()),
            &config(),
        );

        let reply = orch.respond("SUV nào tốt?", &SessionId::from("s")).await.unwrap();
        assert_eq!(reply.path, RoutePath::DirectChat);
        assert!(reply.recorded_error(|e| matches!(e, TierError::StoreUnavailable(m) if m.contains("timed out"))));
    }
}

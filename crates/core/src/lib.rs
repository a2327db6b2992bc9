//! # Carwise Core
//!
//! Domain types, traits, and error definitions for the Carwise automotive
//! assistant. This crate has no framework dependencies; it defines the model
//! the store, tools, providers and orchestrator are written against.
//!
//! Every external collaborator (language model, document store, web search)
//! is a trait here so that tests can substitute scripted fakes.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod store;
pub mod search;
pub mod route;
pub mod event;
pub mod retry;
pub mod text;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, StoreError, ToolError, TierError};
pub use message::{Message, MessageToolCall, Query, Role, SessionId, Turn, TurnRole};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use tool::{ToolCall, ToolResult};
pub use store::{ChunkRecord, DocumentStore, RetrievedChunk, StoreStats};
pub use search::{WebSearchBackend, WebSearchResult};
pub use route::{RouteDecision, RoutePath};
pub use event::{DomainEvent, EventBus};
pub use retry::RetryPolicy;

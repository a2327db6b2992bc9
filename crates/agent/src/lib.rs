//! The Carwise control core.
//!
//! A user turn flows through the [`FallbackOrchestrator`]:
//!
//! 1. **Route**: keyword classification picks the entry tier
//! 2. **Knowledge base**: retrieve, threshold, synthesise
//! 3. **Agent**: bounded tool loop over web search and the knowledge base,
//!    with every tool step captured for display
//! 4. **Direct chat**: plain model call with conversation context
//!
//! The first tier that answers wins; its answer is written to the session's
//! [`ConversationMemory`].

pub mod conversation;
pub mod orchestrator;
pub mod reasoning;
pub mod router;
pub mod session;
pub mod tool_loop;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use conversation::{ConversationInfo, ConversationMemory};
pub use orchestrator::{ChatReply, FallbackOrchestrator, OrchestratorState, TierAttempt, TierOutcome};
pub use reasoning::{ReasoningCapture, ReasoningStep, ReasoningTrace};
pub use router::QueryRouter;
pub use session::{SessionStore, SharedMemory};
pub use tool_loop::{ToolLoop, ToolLoopOutcome};

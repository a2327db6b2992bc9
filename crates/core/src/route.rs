//! Route decisions: which tier a query should try first.

use serde::{Deserialize, Serialize};

/// The preferred path for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePath {
    KnowledgeBase,
    Agent,
    DirectChat,
}

impl std::fmt::Display for RoutePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::KnowledgeBase => "knowledge_base",
            Self::Agent => "agent",
            Self::DirectChat => "direct_chat",
        };
        f.write_str(s)
    }
}

/// Computed once per query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub path: RoutePath,

    /// Why this path was chosen (the matched keyword, or "default")
    pub reason: String,
}

impl RouteDecision {
    pub fn new(path: RoutePath, reason: impl Into<String>) -> Self {
        Self {
            path,
            reason: reason.into(),
        }
    }
}

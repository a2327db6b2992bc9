//! Domain events: decoupled observation of the fallback chain.
//!
//! The orchestrator publishes events as a request moves through its tiers.
//! Front ends and tests subscribe to see which tiers ran and why they failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::route::RoutePath;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The router classified a query
    RouteDecided {
        session_id: String,
        path: RoutePath,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A tier of the fallback chain finished
    TierFinished {
        session_id: String,
        tier: String,
        outcome: String,
        /// Set when the tier failed with a `TierError`
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed during an agent attempt
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A final answer was produced
    ResponseGenerated {
        session_id: String,
        path: RoutePath,
        model: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

//! Domain event system: observation of orchestration runs.
//!
//! The orchestrator publishes events as a run progresses. Subscribers
//! (logging, tests, future metrics) are optional.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::session::Stage;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A user message entered the loop
    TurnStarted {
        session_id: String,
        stage: Stage,
        timestamp: DateTime<Utc>,
    },

    /// A tool call finished (or was rejected before running)
    ToolExecuted {
        session_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool outcome moved the session forward
    StageAdvanced {
        session_id: String,
        from: Stage,
        to: Stage,
        timestamp: DateTime<Utc>,
    },

    /// The model produced a final answer
    TurnCompleted {
        session_id: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// The run ended in an error
    OrchestrationFailed {
        session_id: String,
        reason: String,
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

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

//! Domain events: decoupled communication between bounded contexts.
//!
//! Tool status, orchestration progress, and audit outcomes are published here
//! instead of being threaded through call stacks as callbacks. The UI layer
//! and the log layer subscribe and filter for what they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::log::LogStatus;
use crate::tool::ToolInvocation;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A tool call changed status (`calling`, `complete`, `error`).
    ToolStatus {
        request_id: String,
        invocation: ToolInvocation,
    },

    /// The orchestration loop started a generating turn.
    StepStarted {
        request_id: String,
        step: u32,
        timestamp: DateTime<Utc>,
    },

    /// Model text streamed during an orchestration turn.
    TextDelta {
        request_id: String,
        step: u32,
        delta: String,
    },

    /// A generation audit record was written (or attempted).
    GenerationLogged {
        action: String,
        model: String,
        status: LogStatus,
        timestamp: DateTime<Utc>,
    },

    /// Metered units were charged against a user's quota.
    QuotaConsumed {
        user_id: String,
        metric: String,
        units: u64,
        remaining: u64,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Request this event belongs to, when it is request-scoped.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::ToolStatus { request_id, .. }
            | Self::StepStarted { request_id, .. }
            | Self::TextDelta { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
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

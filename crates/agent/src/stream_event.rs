//! Events delivered to a streaming generation consumer.
//!
//! A stream yields zero or more `partial` events followed by at most one
//! terminal event: `complete` with the validated object, or `error`.
//! A cancelled stream ends without a terminal event.

use prepwise_core::activity::ActivityContent;
use prepwise_core::provider::Usage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// A prefix-consistent, possibly incomplete object.
    Partial { object: serde_json::Value },

    /// The final object, validated against its activity schema.
    Complete {
        content: ActivityContent,
        model: String,
        usage: Option<Usage>,
    },

    /// The generation failed; no `complete` follows.
    Error { message: String },
}

impl GenerationEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Partial { .. } => "partial",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Partial { .. })
    }
}

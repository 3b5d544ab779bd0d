//! Persistence contracts consumed by the core.
//!
//! The core never talks to a database directly. It needs three things:
//! get/set of settings by key, an append-only log (see [`crate::log::LogSink`]),
//! and counters with a guarded increment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Key-value settings storage. Values are JSON documents.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> std::result::Result<Option<serde_json::Value>, StoreError>;

    async fn set(&self, key: &str, value: serde_json::Value) -> std::result::Result<(), StoreError>;
}

/// Result of a guarded increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IncrementOutcome {
    /// The increment was applied; `used` is the new value.
    Applied { used: u64 },
    /// Applying the increment would have exceeded the ceiling; nothing changed.
    Rejected { used: u64 },
}

impl IncrementOutcome {
    pub fn used(&self) -> u64 {
        match self {
            Self::Applied { used } | Self::Rejected { used } => *used,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Counters keyed by string. Missing counters read as zero.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn read(&self, key: &str) -> std::result::Result<u64, StoreError>;

    /// Atomically add `units` to the counter if the result stays `<= ceiling`.
    /// Concurrent callers on the same key must never push it past `ceiling`.
    async fn try_increment(
        &self,
        key: &str,
        units: u64,
        ceiling: u64,
    ) -> std::result::Result<IncrementOutcome, StoreError>;
}

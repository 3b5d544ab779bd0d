//! Generation audit records and the append-only sink they are written to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Token counts recorded for one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
}

/// One write-once audit record per generation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationLogEntry {
    pub id: String,
    /// Task / action name, e.g. "generate_mcq_activity".
    pub action: String,
    /// Model reported by the provider (or the requested one on failure).
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub token_usage: TokenUsage,
    /// Estimated USD cost, rounded to 6 decimals.
    pub estimated_cost: f64,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_first_token_ms: Option<u64>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub search_queries: Vec<String>,
    pub status: LogStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GenerationLogEntry {
    /// A fresh record with a new id; callers fill the remaining fields.
    pub fn new(action: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action: action.into(),
            model: model.into(),
            prompt: String::new(),
            response: String::new(),
            token_usage: TokenUsage::default(),
            estimated_cost: 0.0,
            latency_ms: 0,
            time_to_first_token_ms: None,
            tools_used: Vec::new(),
            search_queries: Vec::new(),
            status: LogStatus::Success,
            error_message: None,
            user_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Append-only destination for generation records.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, entry: GenerationLogEntry) -> std::result::Result<(), StoreError>;

    /// Most recent entries, newest first.
    async fn recent(&self, limit: usize) -> std::result::Result<Vec<GenerationLogEntry>, StoreError>;
}

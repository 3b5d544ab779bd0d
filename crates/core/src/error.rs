//! Error types for the Prepwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` aggregates them.

use crate::tier::Tier;
use thiserror::Error;

/// The top-level error type for all Prepwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Routing / tier configuration ---
    #[error("{0}")]
    Routing(#[from] RoutingError),

    // --- Persistence ---
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    // --- Generation ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, try again in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether the provider reported that the requested model itself is
    /// unavailable (as opposed to the request being throttled or malformed).
    pub fn is_model_unavailable(&self) -> bool {
        match self {
            Self::ModelNotFound(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 404 || *status_code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_id}: {reason}")]
    ExecutionFailed { tool_id: String, reason: String },

    #[error("Tool timed out: {tool_id} after {timeout_secs}s")]
    Timeout { tool_id: String, timeout_secs: u64 },

    #[error("Quota exhausted for {tool_id}: {message}")]
    QuotaExhausted { tool_id: String, message: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Errors raised while resolving the effective generation configuration.
#[derive(Debug, Clone, Error)]
pub enum RoutingError {
    #[error("Tier '{tier}' is not configured (task: {task}); an administrator must set a primary model")]
    TierNotConfigured { tier: Tier, task: String },

    #[error("Failed to read tier configuration: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Stored value for '{key}' is malformed: {reason}")]
    Malformed { key: String, reason: String },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Errors raised by structured generation (single-shot or streaming).
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Provider returned output that does not match the '{schema}' schema: {reason}")]
    SchemaValidation { schema: String, reason: String },

    #[error("A generation for '{0}' is already in flight; pass regenerate to restart it")]
    AlreadyStreaming(String),

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Provider stream ended without a final object")]
    Incomplete,
}

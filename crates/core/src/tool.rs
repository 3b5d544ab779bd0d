//! Tool trait: the abstraction over callable capabilities.
//!
//! Tools are what the model may invoke mid-conversation: web search, page
//! crawling, trend analysis, resource finding, system-design scaffolding.
//! Each tool publishes a [`ToolDescriptor`] that drives plan gating and
//! quota metering, and an `execute` entry point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::ToolError;
use crate::plan::Plan;
use crate::provider::ToolDefinition;

/// Static description of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Stable identifier (e.g. "crawlWeb"); this is the tool's identity.
    pub id: String,

    /// Human-readable name shown in progress UIs.
    pub display_name: String,

    /// Description sent to the model.
    pub description: String,

    /// JSON Schema describing the tool's parameters.
    pub input_schema: serde_json::Value,

    /// Lowest plan allowed to use this tool.
    pub min_plan: Plan,

    /// Whether executions draw from the per-user quota.
    pub requires_quota: bool,
}

impl ToolDescriptor {
    /// Whether `plan` may use this tool. The free plan never gets tools.
    pub fn is_enabled_for_plan(&self, plan: Plan) -> bool {
        plan != Plan::Free && plan >= self.min_plan
    }

    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.id.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}

/// Who a tool is executing for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContext {
    pub request_id: String,
    pub user_id: String,
    pub plan: Plan,
}

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Id of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a successful tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text fed back to the model
    pub output: String,

    /// Structured payload for UIs and audit records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// Build a result whose model-facing text is the pretty-printed payload.
    pub fn from_data(data: serde_json::Value) -> Self {
        Self {
            output: serde_json::to_string_pretty(&data).unwrap_or_default(),
            data: Some(data),
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static description: id, schema, gating flags.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    fn id(&self) -> &str {
        &self.descriptor().id
    }
}

/// Lifecycle state of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Calling,
    Complete,
    Error,
}

/// One status transition of a tool call. A request's invocations form an
/// append-only sequence: `calling` first, then exactly one of
/// `complete` / `error` per call id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_id: String,
    pub status: ToolStatus,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolInvocation {
    pub fn calling(call: &ToolCall) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_id: call.name.clone(),
            status: ToolStatus::Calling,
            input: call.arguments.clone(),
            output: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn complete(call: &ToolCall, output: serde_json::Value) -> Self {
        Self {
            status: ToolStatus::Complete,
            output: Some(output),
            timestamp: Utc::now(),
            ..Self::calling(call)
        }
    }

    pub fn failed(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            error: Some(error.into()),
            timestamp: Utc::now(),
            ..Self::calling(call)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(min_plan: Plan) -> ToolDescriptor {
        ToolDescriptor {
            id: "searchWeb".into(),
            display_name: "Web search".into(),
            description: "Search".into(),
            input_schema: serde_json::json!({"type": "object"}),
            min_plan,
            requires_quota: false,
        }
    }

    #[test]
    fn free_plan_never_enabled() {
        assert!(!descriptor(Plan::Free).is_enabled_for_plan(Plan::Free));
        assert!(descriptor(Plan::Free).is_enabled_for_plan(Plan::Pro));
    }

    #[test]
    fn max_only_tool_gating() {
        let d = descriptor(Plan::Max);
        assert!(!d.is_enabled_for_plan(Plan::Pro));
        assert!(d.is_enabled_for_plan(Plan::Max));
    }

    #[test]
    fn invocation_transitions_keep_identity() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "crawlWeb".into(),
            arguments: serde_json::json!({"url": "https://example.com"}),
        };
        let start = ToolInvocation::calling(&call);
        let done = ToolInvocation::complete(&call, serde_json::json!({"ok": true}));
        let failed = ToolInvocation::failed(&call, "boom");
        assert_eq!(start.status, ToolStatus::Calling);
        assert_eq!(done.call_id, start.call_id);
        assert_eq!(done.status, ToolStatus::Complete);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.input, call.arguments);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ToolStatus::Complete).unwrap(), r#""complete""#);
    }
}

//! Shared test helpers for the agent crate.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use prepwise_core::clock::ManualClock;
use prepwise_core::error::{ProviderError, ToolError};
use prepwise_core::message::{Message, MessageToolCall};
use prepwise_core::plan::{Plan, PlanContext};
use prepwise_core::provider::{
    ChunkReceiver, ModelInfo, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use prepwise_core::tool::{Tool, ToolContext, ToolDescriptor, ToolResult};
use prepwise_store::InMemoryStore;
use prepwise_telemetry::{ModelPricingCache, ObservabilityLogger};
use prepwise_tools::{ModelCapabilities, ToolRegistry, ToolSet};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![Ok(make_text_response(text))])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        let responses = self.responses.lock().unwrap();
        match responses.get(call) {
            Some(response) => response.clone(),
            None => panic!(
                "SequentialMockProvider: no more responses (call #{call}, have {})",
                responses.len()
            ),
        }
    }
}

/// A provider that asks for a tool call on every turn.
pub struct AlwaysCallsTools {
    calls: AtomicUsize,
    tool: String,
}

impl AlwaysCallsTools {
    pub fn new(tool: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            tool: tool.to_string(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for AlwaysCallsTools {
    fn name(&self) -> &str {
        "always_tools"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(make_tool_call_response(
            vec![make_tool_call(&format!("call_{n}"), &self.tool, serde_json::json!({"query": format!("q{n}")}))],
            "",
        ))
    }
}

/// Streams scripted text deltas with a short pause between them.
pub struct ScriptedStreamProvider {
    deltas: Vec<String>,
    pause: std::time::Duration,
}

impl ScriptedStreamProvider {
    pub fn new(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            pause: std::time::Duration::from_millis(5),
        }
    }

    pub fn with_pause(mut self, pause: std::time::Duration) -> Self {
        self.pause = pause;
        self
    }
}

#[async_trait]
impl Provider for ScriptedStreamProvider {
    fn name(&self) -> &str {
        "scripted_stream"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(make_text_response(&self.deltas.concat()))
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let deltas = self.deltas.clone();
        let pause = self.pause;
        tokio::spawn(async move {
            let last = deltas.len().saturating_sub(1);
            for (i, delta) in deltas.into_iter().enumerate() {
                tokio::time::sleep(pause).await;
                let done = i == last;
                let chunk = StreamChunk {
                    content: Some(delta),
                    done,
                    usage: done.then(|| Usage::new(100, 40)),
                    model: Some("mock-model".into()),
                    ..StreamChunk::default()
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// Echoes its arguments back.
pub struct EchoTool {
    descriptor: ToolDescriptor,
}

impl EchoTool {
    pub fn new(id: &str) -> Self {
        Self {
            descriptor: descriptor(id),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, _ctx: &ToolContext, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments
            .get("query")
            .and_then(|q| q.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'query'".into()))?;
        Ok(ToolResult::from_data(serde_json::json!({
            "queries": [query],
            "echo": query,
        })))
    }
}

/// Always fails.
pub struct BrokenTool {
    descriptor: ToolDescriptor,
}

impl BrokenTool {
    pub fn new(id: &str) -> Self {
        Self {
            descriptor: descriptor(id),
        }
    }
}

#[async_trait]
impl Tool for BrokenTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, _ctx: &ToolContext, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_id: self.descriptor.id.clone(),
            reason: "upstream returned 503".into(),
        })
    }
}

fn descriptor(id: &str) -> ToolDescriptor {
    ToolDescriptor {
        id: id.to_string(),
        display_name: id.to_string(),
        description: format!("Test tool {id}"),
        input_schema: serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        min_plan: Plan::Pro,
        requires_quota: false,
    }
}

/// A tool set holding every given tool.
pub fn toolset(tools: Vec<Arc<dyn Tool>>) -> ToolSet {
    let mut registry = ToolRegistry::new();
    let ids: HashSet<String> = tools.iter().map(|t| t.id().to_string()).collect();
    for tool in tools {
        registry.register(tool);
    }
    registry.build(
        &PlanContext::new(Plan::Max),
        &ids,
        &ModelCapabilities::new("mock-model", true),
    )
}

pub fn ctx() -> ToolContext {
    ToolContext {
        request_id: "req-1".into(),
        user_id: "user-1".into(),
        plan: Plan::Max,
    }
}

/// Provider whose model listing is unavailable; prices come from the static table.
struct OfflineCatalog;

#[async_trait]
impl Provider for OfflineCatalog {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("offline".into()))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        Err(ProviderError::Network("offline".into()))
    }
}

pub fn logger() -> (Arc<ObservabilityLogger>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()));
    let pricing = Arc::new(ModelPricingCache::new(
        Arc::new(OfflineCatalog),
        Duration::minutes(15),
        clock,
    ));
    (Arc::new(ObservabilityLogger::new(store.clone(), pricing)), store)
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage::new(10, 5)),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tools(thought, tool_calls),
        usage: Some(Usage::new(10, 5)),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

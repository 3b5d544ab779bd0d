//! The bounded multi-step tool orchestration loop.
//!
//! Each step is one generating turn. If the model asks for tools, every call
//! in that turn runs concurrently, the results are appended to the
//! conversation and the loop goes around again. The loop ends when the model
//! answers without tool calls, or when the step ceiling is reached, whichever
//! comes first. Tool failures are fed back to the model; only a failing
//! provider call aborts the run.
//!
//! Every turn is streamed. Text deltas are published on the [`EventBus`] as
//! [`DomainEvent::TextDelta`] while the turn is still generating, and tool
//! calls are taken from the final chunk.

use chrono::Utc;
use futures::future::join_all;
use prepwise_core::error::ProviderError;
use prepwise_core::event::{DomainEvent, EventBus};
use prepwise_core::message::{Message, MessageToolCall, render_prompt};
use prepwise_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use prepwise_core::tool::{ToolCall, ToolContext, ToolInvocation, ToolStatus};
use prepwise_telemetry::{GenerationSpan, ObservabilityLogger};
use prepwise_tools::{SEARCH_TOOL_IDS, ToolOutcome, ToolSet};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_STEPS: u32 = 5;

/// What a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationOutput {
    /// The model's final text.
    pub text: String,
    /// Terminal record (`complete` or `error`) of every executed tool call.
    pub tool_invocations: Vec<ToolInvocation>,
    /// Model the gateway reported for the last turn.
    pub model_id: String,
    pub warnings: Vec<String>,
    pub usage: Usage,
    pub steps: u32,
}

impl OrchestrationOutput {
    /// Distinct tool ids in first-use order.
    pub fn tools_used(&self) -> Vec<String> {
        let mut used: Vec<String> = Vec::new();
        for invocation in &self.tool_invocations {
            if !used.contains(&invocation.tool_id) {
                used.push(invocation.tool_id.clone());
            }
        }
        used
    }

    /// Queries sent to the search-style tools, deduplicated.
    pub fn search_queries(&self) -> Vec<String> {
        let mut queries: Vec<String> = Vec::new();
        let search_calls = self
            .tool_invocations
            .iter()
            .filter(|i| SEARCH_TOOL_IDS.contains(&i.tool_id.as_str()));

        for invocation in search_calls {
            let reported = invocation
                .output
                .as_ref()
                .and_then(|o| o.get("queries"))
                .and_then(|q| q.as_array())
                .map(|q| {
                    q.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect::<Vec<_>>()
                });
            let found = match reported {
                Some(q) => q,
                None => invocation
                    .input
                    .get("query")
                    .or_else(|| invocation.input.get("topic"))
                    .and_then(|q| q.as_str())
                    .map(|q| vec![q.to_string()])
                    .unwrap_or_default(),
            };
            for query in found {
                if !queries.contains(&query) {
                    queries.push(query);
                }
            }
        }
        queries
    }
}

/// Drives one tool-enabled conversation against a single model.
pub struct OrchestrationLoop {
    provider: Arc<dyn Provider>,
    model: String,
    tools: ToolSet,
    events: Arc<EventBus>,
    logger: Arc<ObservabilityLogger>,
    action: String,
    max_steps: u32,
    temperature: f32,
    max_tokens: Option<u32>,
    provider_tools: Vec<String>,
}

impl OrchestrationLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: ToolSet,
        events: Arc<EventBus>,
        logger: Arc<ObservabilityLogger>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            tools,
            events,
            logger,
            action: "orchestrate".into(),
            max_steps: DEFAULT_MAX_STEPS,
            temperature: prepwise_core::tier::DEFAULT_TEMPERATURE,
            max_tokens: None,
            provider_tools: Vec::new(),
        }
    }

    /// Action name recorded in the audit log (usually the task id).
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Set the step ceiling. At least one step always runs.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_provider_tools(mut self, ids: Vec<String>) -> Self {
        self.provider_tools = ids;
        self
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Run the conversation to completion.
    ///
    /// The provider is called without retries; its first error ends the run,
    /// whether it fails to open the stream or fails mid-stream, and is logged
    /// with zero usage.
    pub async fn run(
        &self,
        messages: Vec<Message>,
        ctx: &ToolContext,
    ) -> Result<OrchestrationOutput, ProviderError> {
        let mut conversation = messages;
        let mut span = self
            .logger
            .begin(&self.action, &self.model)
            .with_prompt(render_prompt(&conversation))
            .with_user(&ctx.user_id);

        let definitions = self.tools.definitions();
        let mut output = OrchestrationOutput {
            text: String::new(),
            tool_invocations: Vec::new(),
            model_id: self.model.clone(),
            warnings: Vec::new(),
            usage: Usage::default(),
            steps: 0,
        };

        info!(
            request_id = %ctx.request_id,
            action = %self.action,
            model = %self.model,
            tools = definitions.len(),
            max_steps = self.max_steps,
            "Starting orchestration"
        );

        loop {
            output.steps += 1;
            let step = output.steps;
            self.events.publish(DomainEvent::StepStarted {
                request_id: ctx.request_id.clone(),
                step,
                timestamp: Utc::now(),
            });
            debug!(request_id = %ctx.request_id, step, "Generating");

            let mut request = ProviderRequest::new(&self.model, conversation.clone());
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;
            request.tools = definitions.clone();
            request.provider_tools = self.provider_tools.clone();
            request.stream = true;

            let response = match self.stream_turn(request, ctx, step, &mut span).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(request_id = %ctx.request_id, step, error = %e, "Provider call failed");
                    span.record_tools(output.tools_used(), output.search_queries());
                    self.logger.finish_error(span, &e).await;
                    return Err(e);
                }
            };

            if let Some(usage) = &response.usage {
                output.usage = output.usage.add(usage);
            }
            if !response.model.is_empty() {
                output.model_id = response.model.clone();
            }

            let tool_calls = response.message.tool_calls.clone();
            if tool_calls.is_empty() {
                output.text = response.message.content.clone();
                conversation.push(response.message);
                break;
            }

            if step >= self.max_steps {
                let pending: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
                warn!(
                    request_id = %ctx.request_id,
                    steps = step,
                    pending = ?pending,
                    "Step ceiling reached, skipping requested tool calls"
                );
                output.warnings.push(format!(
                    "Stopped after {step} steps; {} requested tool call(s) were not executed: {}",
                    pending.len(),
                    pending.join(", ")
                ));
                output.text = response.message.content.clone();
                break;
            }

            debug!(request_id = %ctx.request_id, step, calls = tool_calls.len(), "Executing tool calls");
            conversation.push(response.message);

            let outcomes = join_all(tool_calls.iter().map(|call| self.execute(ctx, call))).await;
            for (call, outcome) in tool_calls.iter().zip(outcomes) {
                conversation.push(Message::tool_result(&call.id, outcome.content));
                if outcome.invocation.status == ToolStatus::Error {
                    debug!(tool = %call.name, "Tool error fed back to the model");
                }
                output.tool_invocations.push(outcome.invocation);
            }
        }

        span.served_by(&output.model_id);
        span.record_tools(output.tools_used(), output.search_queries());
        self.logger
            .finish_success(span, &output.text, Some(output.usage))
            .await;

        info!(
            request_id = %ctx.request_id,
            steps = output.steps,
            tool_calls = output.tool_invocations.len(),
            model = %output.model_id,
            "Orchestration finished"
        );
        Ok(output)
    }

    /// Stream one generating turn, publishing text as it arrives.
    async fn stream_turn(
        &self,
        request: ProviderRequest,
        ctx: &ToolContext,
        step: u32,
        span: &mut GenerationSpan,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut chunks = self.provider.stream(request).await?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = None;
        let mut model = String::new();

        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;
            if let Some(reported) = chunk.model.filter(|m| !m.is_empty()) {
                model = reported;
            }
            if let Some(delta) = chunk.content.filter(|d| !d.is_empty()) {
                span.first_token();
                text.push_str(&delta);
                self.events.publish(DomainEvent::TextDelta {
                    request_id: ctx.request_id.clone(),
                    step,
                    delta,
                });
            }
            tool_calls.extend(chunk.tool_calls);
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }

        Ok(ProviderResponse {
            message: Message::assistant_with_tools(text, tool_calls),
            usage,
            model,
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &MessageToolCall) -> ToolOutcome {
        let arguments = serde_json::from_str(&call.arguments).unwrap_or_else(|e| {
            warn!(tool = %call.name, error = %e, "Tool arguments are not valid JSON");
            serde_json::Value::String(call.arguments.clone())
        });
        let call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        };
        self.tools.invoke(ctx, call, &self.events).await
    }
}

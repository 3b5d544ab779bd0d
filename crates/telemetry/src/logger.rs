//! Generation audit logging.
//!
//! Every generation attempt produces exactly one [`GenerationLogEntry`],
//! written after the outcome is known. Writing is best-effort: a failing log
//! sink is reported with `warn!` and never turns a successful generation
//! into an error.

use chrono::Utc;
use prepwise_core::error::StoreError;
use prepwise_core::event::{DomainEvent, EventBus};
use prepwise_core::log::{GenerationLogEntry, LogSink, LogStatus, TokenUsage};
use prepwise_core::provider::{ProviderResponse, Usage};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::catalog::ModelPricingCache;
use crate::summary::UsageSummary;

/// A provider result the logger knows how to record.
pub trait Loggable {
    fn response_text(&self) -> String;
    fn usage(&self) -> Option<Usage>;
    /// Model the gateway reports having used.
    fn model_id(&self) -> Option<&str>;
}

impl Loggable for ProviderResponse {
    fn response_text(&self) -> String {
        self.message.content.clone()
    }

    fn usage(&self) -> Option<Usage> {
        self.usage
    }

    fn model_id(&self) -> Option<&str> {
        Some(&self.model)
    }
}

/// An in-flight generation being timed.
#[derive(Debug)]
pub struct GenerationSpan {
    entry: GenerationLogEntry,
    started: Instant,
}

impl GenerationSpan {
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.entry.prompt = prompt.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.entry.user_id = Some(user_id.into());
        self
    }

    pub fn action(&self) -> &str {
        &self.entry.action
    }

    /// The model the entry will be priced and recorded against.
    pub fn model(&self) -> &str {
        &self.entry.model
    }

    /// Mark the first streamed token. Only the first call counts.
    pub fn first_token(&mut self) {
        if self.entry.time_to_first_token_ms.is_none() {
            self.entry.time_to_first_token_ms = Some(self.started.elapsed().as_millis() as u64);
        }
    }

    /// Record the model the gateway actually served.
    pub fn served_by(&mut self, model: impl Into<String>) {
        let model = model.into();
        if !model.is_empty() {
            self.entry.model = model;
        }
    }

    pub fn record_tools(&mut self, tools_used: Vec<String>, search_queries: Vec<String>) {
        self.entry.tools_used = tools_used;
        self.entry.search_queries = search_queries;
    }
}

pub struct ObservabilityLogger {
    sink: Arc<dyn LogSink>,
    pricing: Arc<ModelPricingCache>,
    events: Option<Arc<EventBus>>,
    log_prompts: bool,
}

impl ObservabilityLogger {
    pub fn new(sink: Arc<dyn LogSink>, pricing: Arc<ModelPricingCache>) -> Self {
        Self {
            sink,
            pricing,
            events: None,
            log_prompts: true,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// When false, prompts and responses are not stored in log entries.
    pub fn with_log_prompts(mut self, log_prompts: bool) -> Self {
        self.log_prompts = log_prompts;
        self
    }

    pub fn pricing(&self) -> &Arc<ModelPricingCache> {
        &self.pricing
    }

    /// Start timing a generation for `action` against `model`.
    pub fn begin(&self, action: impl Into<String>, model: impl Into<String>) -> GenerationSpan {
        GenerationSpan {
            entry: GenerationLogEntry::new(action, model),
            started: Instant::now(),
        }
    }

    pub async fn finish_success(
        &self,
        span: GenerationSpan,
        response: impl Into<String>,
        usage: Option<Usage>,
    ) -> GenerationLogEntry {
        let GenerationSpan { mut entry, started } = span;
        entry.latency_ms = started.elapsed().as_millis() as u64;
        entry.response = response.into();
        entry.status = LogStatus::Success;

        let usage = usage.unwrap_or_default();
        entry.token_usage = TokenUsage {
            input: usage.prompt_tokens,
            output: usage.completion_tokens,
        };
        entry.estimated_cost = self
            .pricing
            .estimate_cost(&entry.model, usage.prompt_tokens, usage.completion_tokens)
            .await;

        self.write(entry).await
    }

    /// Record a failed attempt with zero usage.
    ///
    /// The error is rendered before the returned future is created, so the
    /// future stays `Send` whatever the error type.
    pub fn finish_error<'a>(
        &'a self,
        span: GenerationSpan,
        error: &dyn Display,
    ) -> impl Future<Output = GenerationLogEntry> + use<'a> {
        let message = error.to_string();
        self.record_error(span, message)
    }

    async fn record_error(&self, span: GenerationSpan, message: String) -> GenerationLogEntry {
        let GenerationSpan { mut entry, started } = span;
        entry.latency_ms = started.elapsed().as_millis() as u64;
        entry.status = LogStatus::Error;
        entry.error_message = Some(message);
        entry.token_usage = TokenUsage::default();
        entry.estimated_cost = 0.0;

        self.write(entry).await
    }

    /// Run `call`, logging its outcome. The result passes through untouched.
    pub async fn wrap<T, E, F>(&self, mut span: GenerationSpan, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        T: Loggable,
        E: Display,
    {
        match call.await {
            Ok(result) => {
                if let Some(model) = result.model_id() {
                    span.served_by(model);
                }
                self.finish_success(span, result.response_text(), result.usage())
                    .await;
                Ok(result)
            }
            Err(e) => {
                self.finish_error(span, &e).await;
                Err(e)
            }
        }
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<GenerationLogEntry>, StoreError> {
        self.sink.recent(limit).await
    }

    /// Usage aggregated over the most recent `limit` entries.
    pub async fn summary(&self, limit: usize) -> Result<UsageSummary, StoreError> {
        let entries = self.sink.recent(limit).await?;
        Ok(UsageSummary::from_entries(&entries))
    }

    async fn write(&self, mut entry: GenerationLogEntry) -> GenerationLogEntry {
        if !self.log_prompts {
            entry.prompt.clear();
            entry.response.clear();
        }

        match self.sink.append(entry.clone()).await {
            Ok(()) => debug!(
                action = %entry.action,
                model = %entry.model,
                status = ?entry.status,
                latency_ms = entry.latency_ms,
                cost = entry.estimated_cost,
                "Generation logged"
            ),
            Err(e) => warn!(
                action = %entry.action,
                model = %entry.model,
                error = %e,
                "Failed to write generation log"
            ),
        }

        if let Some(events) = &self.events {
            events.publish(DomainEvent::GenerationLogged {
                action: entry.action.clone(),
                model: entry.model.clone(),
                status: entry.status,
                timestamp: Utc::now(),
            });
        }
        entry
    }
}

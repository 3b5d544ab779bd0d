//! Single-shot structured generation without streaming.

use prepwise_core::activity::ActivityContent;
use prepwise_core::error::{Error, GenerationError};
use prepwise_core::message::render_prompt;
use prepwise_core::provider::{Provider, ProviderResponse, Usage};
use prepwise_telemetry::{Loggable, ObservabilityLogger};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::partial::parse_complete;
use crate::request::GenerationRequest;

#[derive(Debug, Clone, Serialize)]
pub struct StructuredOutput {
    pub content: ActivityContent,
    /// Model the gateway reported.
    pub model: String,
    pub usage: Option<Usage>,
}

/// A provider response whose content passed validation.
struct Validated {
    response: ProviderResponse,
    content: ActivityContent,
}

impl Loggable for Validated {
    fn response_text(&self) -> String {
        self.response.response_text()
    }

    fn usage(&self) -> Option<Usage> {
        self.response.usage
    }

    fn model_id(&self) -> Option<&str> {
        Some(&self.response.model)
    }
}

pub struct StructuredGenerator {
    logger: Arc<ObservabilityLogger>,
}

impl StructuredGenerator {
    pub fn new(logger: Arc<ObservabilityLogger>) -> Self {
        Self { logger }
    }

    /// Generate and validate one activity. Provider and schema failures are
    /// both fatal and both logged.
    pub async fn generate(
        &self,
        provider: &dyn Provider,
        request: &GenerationRequest,
    ) -> Result<StructuredOutput, Error> {
        let kind = request.kind;
        let mut span = self
            .logger
            .begin(&request.task, &request.model)
            .with_prompt(render_prompt(&request.messages()));
        if let Some(user) = &request.user_id {
            span = span.with_user(user);
        }

        let call = async {
            let response = provider.complete(request.to_provider_request(false)).await?;
            let value = parse_complete(&response.message.content).ok_or_else(|| {
                GenerationError::SchemaValidation {
                    schema: kind.as_str().to_string(),
                    reason: "response is not a JSON object".into(),
                }
            })?;
            let content = ActivityContent::parse(kind, value)?;
            Ok::<_, Error>(Validated { response, content })
        };

        match self.logger.wrap(span, call).await {
            Ok(Validated { response, content }) => {
                let model = if response.model.is_empty() {
                    request.model.clone()
                } else {
                    response.model
                };
                debug!(activity = %kind, %model, "Structured generation complete");
                Ok(StructuredOutput {
                    content,
                    model,
                    usage: response.usage,
                })
            }
            Err(e) => {
                warn!(activity = %kind, error = %e, "Structured generation failed");
                Err(e)
            }
        }
    }
}

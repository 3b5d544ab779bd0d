//! The generation pipeline, end to end.
//!
//! `GenerationService` resolves the tier for a task, routes to a provider,
//! builds the request's tool set and then runs the orchestration loop,
//! a single structured generation, or a stream. Every path is logged.

use prepwise_core::activity::ActivityKind;
use prepwise_core::error::Error;
use prepwise_core::event::EventBus;
use prepwise_core::message::Message;
use prepwise_core::plan::PlanContext;
use prepwise_core::provider::Provider;
use prepwise_core::store::SettingsStore;
use prepwise_core::tier::{ByokConfig, EffectiveConfig};
use prepwise_core::tool::ToolContext;
use prepwise_providers::ProviderRouter;
use prepwise_routing::TierConfigResolver;
use prepwise_telemetry::{ModelPricingCache, ObservabilityLogger};
use prepwise_tools::{ModelCapabilities, ToolRegistry, load_enabled_tool_ids};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::loop_runner::{DEFAULT_MAX_STEPS, OrchestrationLoop, OrchestrationOutput};
use crate::request::GenerationRequest;
use crate::streaming::{GenerationStream, StreamingGenerator};
use crate::structured::{StructuredGenerator, StructuredOutput};

const ASK_SYSTEM_PROMPT: &str = "You are an expert interview-preparation assistant. \
Use the available tools when current information would improve the answer, \
and mention the sources you relied on.";

/// A free-form, tool-enabled question.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub request_id: String,
    pub task: String,
    pub prompt: String,
    pub user_id: String,
    pub plan: PlanContext,
    pub byok: Option<ByokConfig>,
    pub system_prompt: Option<String>,
}

impl AskRequest {
    pub fn new(
        task: impl Into<String>,
        prompt: impl Into<String>,
        user_id: impl Into<String>,
        plan: PlanContext,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            task: task.into(),
            prompt: prompt.into(),
            user_id: user_id.into(),
            plan,
            byok: None,
            system_prompt: None,
        }
    }

    pub fn with_byok(mut self, byok: ByokConfig) -> Self {
        self.byok = Some(byok);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// A structured activity to generate.
#[derive(Debug, Clone)]
pub struct ActivityRequest {
    pub kind: ActivityKind,
    /// Routing task; the kind's own task when unset.
    pub task: Option<String>,
    pub topic: String,
    pub user_id: Option<String>,
    pub plan: Option<PlanContext>,
    pub byok: Option<ByokConfig>,
}

impl ActivityRequest {
    pub fn new(kind: ActivityKind, topic: impl Into<String>) -> Self {
        Self {
            kind,
            task: None,
            topic: topic.into(),
            user_id: None,
            plan: None,
            byok: None,
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn task(&self) -> &str {
        self.task.as_deref().unwrap_or(self.kind.task())
    }

    pub fn for_user(mut self, user_id: impl Into<String>, plan: PlanContext) -> Self {
        self.user_id = Some(user_id.into());
        self.plan = Some(plan);
        self
    }

    pub fn with_byok(mut self, byok: ByokConfig) -> Self {
        self.byok = Some(byok);
        self
    }

    fn prompt(&self) -> String {
        let what = match self.kind {
            ActivityKind::Mcq => "a multiple-choice quiz",
            ActivityKind::Flashcards => "a set of flashcards",
            ActivityKind::CodingChallenge => "a coding challenge",
            ActivityKind::SystemDesign => "a system design exercise",
            ActivityKind::ConceptExplanation => "a concept explanation",
        };
        format!("Create {what} about: {}", self.topic)
    }
}

pub struct GenerationService {
    resolver: Arc<TierConfigResolver>,
    router: Arc<ProviderRouter>,
    pricing: Arc<ModelPricingCache>,
    logger: Arc<ObservabilityLogger>,
    settings: Arc<dyn SettingsStore>,
    registry: Arc<ToolRegistry>,
    events: Arc<EventBus>,
    streaming: StreamingGenerator,
    structured: StructuredGenerator,
    default_tool_ids: Vec<String>,
    max_steps: u32,
}

impl GenerationService {
    pub fn new(
        resolver: Arc<TierConfigResolver>,
        router: Arc<ProviderRouter>,
        logger: Arc<ObservabilityLogger>,
        settings: Arc<dyn SettingsStore>,
        registry: Arc<ToolRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            resolver,
            router,
            pricing: logger.pricing().clone(),
            streaming: StreamingGenerator::new(logger.clone()),
            structured: StructuredGenerator::new(logger.clone()),
            logger,
            settings,
            registry,
            events,
            default_tool_ids: prepwise_config::DEFAULT_TOOL_IDS
                .iter()
                .map(|id| id.to_string())
                .collect(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Tool ids enabled when the `tools.enabled` setting is absent.
    pub fn with_default_tools(mut self, ids: Vec<String>) -> Self {
        self.default_tool_ids = ids;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn resolver(&self) -> &TierConfigResolver {
        &self.resolver
    }

    pub fn logger(&self) -> &Arc<ObservabilityLogger> {
        &self.logger
    }

    pub fn pricing(&self) -> &Arc<ModelPricingCache> {
        &self.pricing
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    async fn route(
        &self,
        task: &str,
        byok: Option<&ByokConfig>,
        plan: Option<&PlanContext>,
    ) -> Result<(EffectiveConfig, Arc<dyn Provider>), Error> {
        let config = self.resolver.resolve(task, byok, plan).await?;
        let provider = self.router.route(&config)?;
        debug!(
            task,
            tier = %config.tier,
            provider = %config.provider,
            model = %config.model,
            source = ?config.source,
            "Routed request"
        );
        Ok((config, provider))
    }

    /// Answer a question with the tool-enabled orchestration loop.
    pub async fn ask(&self, request: AskRequest) -> Result<OrchestrationOutput, Error> {
        let (config, provider) = self
            .route(&request.task, request.byok.as_ref(), Some(&request.plan))
            .await?;

        // Capability is judged on the model the loop will call.
        let supports_tools = self
            .pricing
            .supports_tools(&config.model)
            .await
            .unwrap_or(false);
        if let Some(selected) = request.plan.selected_model_id.as_deref().filter(|m| *m != config.model) {
            debug!(selected, model = %config.model, "Selected model differs from the resolved model");
        }
        let enabled = load_enabled_tool_ids(self.settings.as_ref(), &self.default_tool_ids).await?;
        let tools = self.registry.build(
            &request.plan,
            &enabled,
            &ModelCapabilities::new(&config.model, supports_tools),
        );

        let mut warnings = Vec::new();
        if !supports_tools {
            warnings.push(format!(
                "Model '{}' does not declare tool support; answering without tools",
                config.model
            ));
        }
        // Without tools there is nothing to loop over.
        let max_steps = if tools.is_empty() { 1 } else { self.max_steps };

        info!(
            request_id = %request.request_id,
            task = %request.task,
            plan = %request.plan.plan,
            tools = ?tools.ids(),
            "Running tool orchestration"
        );

        let orchestrator = OrchestrationLoop::new(
            provider,
            &config.model,
            tools,
            self.events.clone(),
            self.logger.clone(),
        )
        .with_action(&request.task)
        .with_max_steps(max_steps)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_provider_tools(request.plan.provider_tool_ids.clone());

        let ctx = ToolContext {
            request_id: request.request_id.clone(),
            user_id: request.user_id.clone(),
            plan: request.plan.plan,
        };
        let system = request
            .system_prompt
            .clone()
            .unwrap_or_else(|| ASK_SYSTEM_PROMPT.to_string());
        let messages = vec![Message::system(system), Message::user(&request.prompt)];

        let mut output = orchestrator.run(messages, &ctx).await?;
        warnings.append(&mut output.warnings);
        output.warnings = warnings;
        Ok(output)
    }

    /// Generate one activity in a single call.
    pub async fn generate(&self, request: &ActivityRequest) -> Result<StructuredOutput, Error> {
        let (provider, generation) = self.generation_request(request).await?;
        self.structured.generate(provider.as_ref(), &generation).await
    }

    /// Stream one activity under `session_key`.
    pub async fn stream(
        &self,
        request: &ActivityRequest,
        session_key: impl Into<String>,
        regenerate: bool,
    ) -> Result<GenerationStream, Error> {
        let (provider, generation) = self.generation_request(request).await?;
        Ok(self
            .streaming
            .start(provider, session_key, generation, regenerate)?)
    }

    pub fn cancel(&self, session_key: &str) -> bool {
        self.streaming.cancel(session_key)
    }

    async fn generation_request(
        &self,
        request: &ActivityRequest,
    ) -> Result<(Arc<dyn Provider>, GenerationRequest), Error> {
        let (config, provider) = self
            .route(request.task(), request.byok.as_ref(), request.plan.as_ref())
            .await?;
        let mut generation = GenerationRequest::for_config(request.kind, &config, request.prompt());
        if let Some(user) = &request.user_id {
            generation = generation.with_user(user);
        }
        Ok((provider, generation))
    }
}

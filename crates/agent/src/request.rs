//! Structured generation requests.

use prepwise_core::activity::ActivityKind;
use prepwise_core::message::Message;
use prepwise_core::provider::ProviderRequest;
use prepwise_core::tier::EffectiveConfig;

/// One schema-constrained generation of an activity.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: ActivityKind,
    /// Task id recorded as the log action; defaults to the kind's own task.
    pub task: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: String,
    pub user_prompt: String,
    pub user_id: Option<String>,
}

impl GenerationRequest {
    pub fn new(kind: ActivityKind, model: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            kind,
            task: kind.task().to_string(),
            model: model.into(),
            temperature: prepwise_core::tier::DEFAULT_TEMPERATURE,
            max_tokens: None,
            system_prompt: system_prompt(kind),
            user_prompt: user_prompt.into(),
            user_id: None,
        }
    }

    /// A request using the model and sampling settings of a resolved tier.
    pub fn for_config(kind: ActivityKind, config: &EffectiveConfig, user_prompt: impl Into<String>) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
            task: config.task.clone(),
            ..Self::new(kind, &config.model, user_prompt)
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn messages(&self) -> Vec<Message> {
        vec![
            Message::system(&self.system_prompt),
            Message::user(&self.user_prompt),
        ]
    }

    pub fn to_provider_request(&self, stream: bool) -> ProviderRequest {
        let mut request = ProviderRequest::new(&self.model, self.messages());
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request.response_schema = Some(self.kind.response_schema());
        request.stream = stream;
        request
    }
}

/// Default instructions for an activity kind.
pub fn system_prompt(kind: ActivityKind) -> String {
    let focus = match kind {
        ActivityKind::Mcq => {
            "Write multiple-choice questions with exactly one correct option and a short explanation each."
        }
        ActivityKind::Flashcards => "Write concise flashcards: a prompt on the front, the answer on the back.",
        ActivityKind::CodingChallenge => {
            "Write a self-contained coding challenge with starter code, hints and test cases."
        }
        ActivityKind::SystemDesign => {
            "Write a system design exercise: requirements, core components and their tradeoffs."
        }
        ActivityKind::ConceptExplanation => {
            "Explain the concept plainly, in short sections, ending with the key points to remember."
        }
    };
    format!(
        "You are an expert tutor preparing learners for technical interviews. {focus} \
         Respond with a single JSON object matching the '{}' schema and nothing else.",
        kind.as_str()
    )
}

//! Provider router: selects the gateway for an effective configuration.
//!
//! Registered providers are built once from `AppConfig`. A BYOK entry that
//! carries its own API key gets an ad-hoc gateway client so user keys are
//! never mixed with the system key.

use prepwise_config::AppConfig;
use prepwise_core::error::ProviderError;
use prepwise_core::provider::Provider;
use prepwise_core::tier::EffectiveConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::fallback::{DEFAULT_PROVIDER_TIMEOUT, ModelFallbackProvider};
use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    base_urls: HashMap<String, String>,
    default_provider: String,
    timeout: Duration,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            base_urls: HashMap::new(),
            default_provider: default_provider.into(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    /// The raw provider serving `config` (no fallback or timeout applied).
    pub fn provider_for(&self, config: &EffectiveConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            let base_url = self
                .base_urls
                .get(&config.provider)
                .cloned()
                .unwrap_or_else(|| default_base_url(&config.provider));
            debug!(provider = %config.provider, "Using caller-supplied API key");
            return Ok(Arc::new(OpenAiCompatProvider::new(
                &config.provider,
                base_url,
                key,
            )));
        }

        self.get(&config.provider).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "No provider '{}' is registered (known: {})",
                config.provider,
                self.list().join(", ")
            ))
        })
    }

    /// The provider for `config`, wrapped with its fallback model and the
    /// router's timeout.
    pub fn route(&self, config: &EffectiveConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        let provider = self.provider_for(config)?;
        Ok(Arc::new(
            ModelFallbackProvider::new(provider)
                .with_fallback_model(config.fallback_model.clone())
                .with_timeout(self.timeout),
        ))
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider).with_timeout(
        Duration::from_secs(config.orchestration.provider_timeout_secs),
    );

    for (name, provider_config) in &config.providers {
        let api_key = config.api_key_for(name).unwrap_or_default();
        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        router.base_urls.insert(name.clone(), base_url.clone());
        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key)),
        );
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(&config.default_provider);
        router.register(
            config.default_provider.clone(),
            Arc::new(OpenAiCompatProvider::new(
                &config.default_provider,
                &base_url,
                &api_key,
            )),
        );
    }

    router
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        _ => "https://openrouter.ai/api/v1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prepwise_core::tier::{ConfigSource, Tier};

    fn effective(provider: &str, api_key: Option<&str>) -> EffectiveConfig {
        EffectiveConfig {
            task: "generate_topics".into(),
            tier: Tier::High,
            provider: provider.into(),
            model: "openai/gpt-4o".into(),
            fallback_model: None,
            temperature: 0.7,
            max_tokens: 4096,
            source: ConfigSource::System,
            api_key: api_key.map(String::from),
        }
    }

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openrouter");
        router.register("openrouter", Arc::new(OpenAiCompatProvider::openrouter("sk-test")));

        assert!(router.get("openrouter").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default_provider().is_some());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("unknown").contains("openrouter.ai"));
    }

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let router = build_from_config(&config);
        assert!(router.default_provider().is_some());
        assert_eq!(router.list(), vec!["openrouter"]);
    }

    #[test]
    fn unregistered_provider_is_not_configured() {
        let router = build_from_config(&AppConfig::default());
        let err = router.route(&effective("anthropic", None)).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn byok_key_builds_ad_hoc_provider() {
        let router = build_from_config(&AppConfig::default());
        let provider = router
            .provider_for(&effective("openai", Some("sk-user")))
            .unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn route_wraps_registered_provider() {
        let router = build_from_config(&AppConfig::default());
        let provider = router.route(&effective("openrouter", None)).unwrap();
        assert_eq!(provider.name(), "openrouter");
    }
}

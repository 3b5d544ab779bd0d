//! Configuration loading, validation, and management for Prepwise.
//!
//! Loads configuration from `~/.prepwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use chrono::{DateTime, Utc};
use prepwise_core::plan::Plan;
use prepwise_core::tier::{Tier, TierConfig, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Ids of every built-in tool, enabled by default.
pub const DEFAULT_TOOL_IDS: [&str; 5] = [
    "searchWeb",
    "crawlWeb",
    "analyzeTrends",
    "findResources",
    "generateSystemDesign",
];

/// The root configuration structure.
///
/// Maps directly to `~/.prepwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gateway API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider used when a tier or BYOK entry does not name one
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Seed values for the per-tier settings, keyed by tier name
    #[serde(default)]
    pub tiers: BTreeMap<String, TierSeed>,

    /// Orchestration loop limits
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Metered-tool quota
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Tool catalog settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Pricing and audit logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Persistence backend
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_provider() -> String {
    prepwise_core::tier::DEFAULT_PROVIDER.into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("providers", &self.providers)
            .field("tiers", &self.tiers)
            .field("orchestration", &self.orchestration)
            .field("quota", &self.quota)
            .field("tools", &self.tools)
            .field("telemetry", &self.telemetry)
            .field("storage", &self.storage)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Initial values for one tier, written to the settings store by `init --seed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierSeed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl TierSeed {
    pub fn to_tier_config(&self, tier: Tier, default_provider: &str) -> TierConfig {
        TierConfig {
            tier,
            provider: self
                .provider
                .clone()
                .unwrap_or_else(|| default_provider.to_string()),
            primary_model: self.primary_model.clone(),
            fallback_model: self.fallback_model.clone(),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Generating turns per request before the loop is forced to stop
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Timeout applied to every provider call
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
}

fn default_max_steps() -> u32 {
    5
}
fn default_provider_timeout() -> u64 {
    120
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            provider_timeout_secs: default_provider_timeout(),
        }
    }
}

/// How quota usage is bucketed over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    #[default]
    Daily,
    Monthly,
}

impl QuotaPeriod {
    /// Calendar bucket (UTC) that `now` falls into.
    pub fn period_key(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::Daily => now.format("%Y-%m-%d").to_string(),
            Self::Monthly => now.format("%Y-%m").to_string(),
        }
    }
}

/// Metered units allowed per period, per plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    #[serde(default)]
    pub free: u64,
    #[serde(default = "default_pro_limit")]
    pub pro: u64,
    #[serde(default = "default_max_limit")]
    pub max: u64,
}

fn default_pro_limit() -> u64 {
    20
}
fn default_max_limit() -> u64 {
    100
}

impl QuotaLimits {
    pub fn for_plan(&self, plan: Plan) -> u64 {
        match plan {
            Plan::Free => self.free,
            Plan::Pro => self.pro,
            Plan::Max => self.max,
        }
    }
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            free: 0,
            pro: default_pro_limit(),
            max: default_max_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default)]
    pub period: QuotaPeriod,

    #[serde(default)]
    pub limits: QuotaLimits,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Allow-list used when the settings store has no `tools.enabled` entry
    #[serde(default = "default_enabled_tools")]
    pub enabled: Vec<String>,

    /// Base URL of the search/crawl backend
    #[serde(default = "default_search_api_url")]
    pub search_api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,

    #[serde(default = "default_crawl_timeout")]
    pub crawl_timeout_secs: u64,

    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
}

fn default_enabled_tools() -> Vec<String> {
    DEFAULT_TOOL_IDS.iter().map(|s| s.to_string()).collect()
}
fn default_search_api_url() -> String {
    "https://api.firecrawl.dev".into()
}
fn default_crawl_timeout() -> u64 {
    30
}
fn default_max_search_results() -> usize {
    5
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_tools(),
            search_api_url: default_search_api_url(),
            search_api_key: None,
            crawl_timeout_secs: default_crawl_timeout(),
            max_search_results: default_max_search_results(),
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("enabled", &self.enabled)
            .field("search_api_url", &self.search_api_url)
            .field("search_api_key", &redact(&self.search_api_key))
            .field("crawl_timeout_secs", &self.crawl_timeout_secs)
            .field("max_search_results", &self.max_search_results)
            .finish()
    }
}

/// Pricing cache and audit logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// How long fetched model pricing stays fresh
    #[serde(default = "default_pricing_ttl")]
    pub pricing_ttl_secs: u64,

    /// Custom model pricing overrides (model name → pricing)
    #[serde(default)]
    pub custom_pricing: HashMap<String, PricingOverrideConfig>,

    /// Store prompt and response text in generation logs
    #[serde(default = "default_true")]
    pub log_prompts: bool,
}

fn default_pricing_ttl() -> u64 {
    900
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            pricing_ttl_secs: default_pricing_ttl(),
            custom_pricing: HashMap::new(),
            log_prompts: true,
        }
    }
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database file; defaults to `~/.prepwise/prepwise.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("prepwise.db"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.prepwise/config.toml).
    ///
    /// Also checks environment variables:
    /// - `PREPWISE_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `PREPWISE_SEARCH_API_KEY` for the search backend
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply the environment variable overrides listed on [`AppConfig::load`].
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("PREPWISE_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = std::env::var("OPENROUTER_API_KEY").ok();
        }

        if let Ok(key) = std::env::var("PREPWISE_SEARCH_API_KEY") {
            self.tools.search_api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".prepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, seed) in &self.tiers {
            name.parse::<Tier>().map_err(ConfigError::ValidationError)?;
            if let Some(t) = seed.temperature {
                if !(0.0..=2.0).contains(&t) {
                    return Err(ConfigError::ValidationError(format!(
                        "tiers.{name}.temperature must be between 0.0 and 2.0"
                    )));
                }
            }
            if seed.max_tokens == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "tiers.{name}.max_tokens must be > 0"
                )));
            }
        }

        if self.orchestration.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration.max_steps must be >= 1".into(),
            ));
        }

        if self.telemetry.pricing_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "telemetry.pricing_ttl_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Tier seeds as typed tier configurations, skipping unknown tier names.
    pub fn tier_seeds(&self) -> Vec<TierConfig> {
        self.tiers
            .iter()
            .filter_map(|(name, seed)| {
                let tier = name.parse::<Tier>().ok()?;
                Some(seed.to_tier_config(tier, &self.default_provider))
            })
            .collect()
    }

    /// API key for `provider`: the provider's own key, else the top-level one.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some() || self.providers.values().any(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let mut config = Self::default();
        for tier in Tier::ALL {
            config.tiers.insert(tier.as_str().into(), TierSeed::default());
        }
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            providers: HashMap::new(),
            tiers: BTreeMap::new(),
            orchestration: OrchestrationConfig::default(),
            quota: QuotaConfig::default(),
            tools: ToolsConfig::default(),
            telemetry: TelemetryConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.orchestration.max_steps, 5);
        assert_eq!(config.telemetry.pricing_ttl_secs, 900);
        assert_eq!(config.quota.limits.for_plan(Plan::Free), 0);
        assert_eq!(config.tools.enabled.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.quota.limits, config.quota.limits);
    }

    #[test]
    fn invalid_tier_temperature_rejected() {
        let mut config = AppConfig::default();
        config.tiers.insert(
            "high".into(),
            TierSeed {
                temperature: Some(5.0),
                ..TierSeed::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_tier_name_rejected() {
        let mut config = AppConfig::default();
        config.tiers.insert("ultra".into(), TierSeed::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_steps_rejected() {
        let mut config = AppConfig::default();
        config.orchestration.max_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn load_from_file_with_tiers_and_quota() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
api_key = "sk-test"

[tiers.high]
primary_model = "anthropic/claude-sonnet-4"
fallback_model = "openai/gpt-4o"

[tiers.low]
primary_model = "openai/gpt-4o-mini"
temperature = 0.2

[quota]
period = "monthly"

[quota.limits]
pro = 50

[storage]
backend = "memory"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.quota.period, QuotaPeriod::Monthly);
        assert_eq!(config.quota.limits.pro, 50);
        assert_eq!(config.quota.limits.max, 100);
        assert_eq!(config.storage.backend, StorageBackend::Memory);

        let seeds = config.tier_seeds();
        assert_eq!(seeds.len(), 2);
        let high = seeds.iter().find(|s| s.tier == Tier::High).unwrap();
        assert_eq!(high.primary_model.as_deref(), Some("anthropic/claude-sonnet-4"));
        assert_eq!(high.provider, "openrouter");
        let low = seeds.iter().find(|s| s.tier == Tier::Low).unwrap();
        assert!((low.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(low.max_tokens, 4096);
    }

    #[test]
    fn unparseable_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn provider_key_wins_over_top_level() {
        let mut config = AppConfig {
            api_key: Some("top".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("own".into()),
                api_url: None,
            },
        );
        assert_eq!(config.api_key_for("openai").as_deref(), Some("own"));
        assert_eq!(config.api_key_for("openrouter").as_deref(), Some("top"));
    }

    #[test]
    fn debug_redacts_keys() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.tools.search_api_key = Some("fc-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("fc-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn period_keys() {
        let now = Utc.with_ymd_and_hms(2026, 2, 28, 23, 59, 59).unwrap();
        assert_eq!(QuotaPeriod::Daily.period_key(now), "2026-02-28");
        assert_eq!(QuotaPeriod::Monthly.period_key(now), "2026-02");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("tiers"));
        assert!(toml_str.contains("high"));
        assert!(toml_str.contains("max_steps = 5"));
    }
}

//! Model tiers, per-tier configuration, and caller-supplied overrides.
//!
//! A tier is a cost/capability bucket. Administrators map each tier to a
//! primary model; callers may bring their own key (BYOK) and override the
//! model for any tier.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Default temperature applied when neither the tier nor the override sets one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default completion budget applied when neither the tier nor the override sets one.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Provider used for BYOK overrides that do not name one.
pub const DEFAULT_PROVIDER: &str = "openrouter";

/// A cost/capability bucket, ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Low, Tier::Medium, Tier::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown tier '{other}' (expected low, medium or high)")),
        }
    }
}

/// Administrator-managed settings for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub tier: Tier,

    #[serde(default = "default_provider")]
    pub provider: String,

    /// `None` means the tier is unconfigured.
    #[serde(default)]
    pub primary_model: Option<String>,

    #[serde(default)]
    pub fallback_model: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.into()
}
fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}
fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl TierConfig {
    /// An unconfigured tier: no primary model, default sampling settings.
    pub fn unconfigured(tier: Tier) -> Self {
        Self {
            tier,
            provider: default_provider(),
            primary_model: None,
            fallback_model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.primary_model
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty())
    }
}

/// A caller-supplied override for a single tier.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ByokOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default)]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// The caller's own provider key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl fmt::Debug for ByokOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByokOverride")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("fallback", &self.fallback)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

/// Per-tier BYOK overrides supplied with a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByokConfig(pub HashMap<Tier, ByokOverride>);

impl ByokConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tier: Tier, entry: ByokOverride) -> Self {
        self.0.insert(tier, entry);
        self
    }

    /// The override for `tier`, if one exists with a non-empty model.
    pub fn active_for(&self, tier: Tier) -> Option<&ByokOverride> {
        self.0.get(&tier).filter(|o| !o.model.trim().is_empty())
    }
}

/// Where an effective configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Byok,
    System,
}

/// The fully resolved generation settings for one task invocation.
#[derive(Clone, Serialize)]
pub struct EffectiveConfig {
    pub task: String,
    pub tier: Tier,
    pub provider: String,
    pub model: String,
    pub fallback_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub source: ConfigSource,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl fmt::Debug for EffectiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectiveConfig")
            .field("task", &self.task)
            .field("tier", &self.tier)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("fallback_model", &self.fallback_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("source", &self.source)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_follows_capability() {
        assert!(Tier::Low < Tier::Medium);
        assert!(Tier::Medium < Tier::High);
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Tier>().unwrap(), Tier::High);
        assert_eq!(" medium ".parse::<Tier>().unwrap(), Tier::Medium);
        assert!("ultra".parse::<Tier>().is_err());
    }

    #[test]
    fn tier_config_deserializes_with_defaults() {
        let cfg: TierConfig = serde_json::from_str(r#"{"tier":"low"}"#).unwrap();
        assert_eq!(cfg.provider, "openrouter");
        assert!(!cfg.is_configured());
        assert_eq!(cfg.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn blank_primary_model_is_unconfigured() {
        let mut cfg = TierConfig::unconfigured(Tier::High);
        cfg.primary_model = Some("   ".into());
        assert!(!cfg.is_configured());
        cfg.primary_model = Some("openai/gpt-4o".into());
        assert!(cfg.is_configured());
    }

    #[test]
    fn byok_ignores_empty_model() {
        let byok = ByokConfig::new().with(
            Tier::High,
            ByokOverride {
                model: String::new(),
                ..Default::default()
            },
        );
        assert!(byok.active_for(Tier::High).is_none());
    }

    #[test]
    fn byok_keyed_by_tier_name_in_json() {
        let byok: ByokConfig =
            serde_json::from_str(r#"{"medium":{"model":"my/model","temperature":0.2}}"#).unwrap();
        let entry = byok.active_for(Tier::Medium).unwrap();
        assert_eq!(entry.model, "my/model");
        assert_eq!(entry.temperature, Some(0.2));
    }

    #[test]
    fn debug_redacts_api_key() {
        let entry = ByokOverride {
            model: "m".into(),
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let dbg = format!("{entry:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("REDACTED"));
    }
}

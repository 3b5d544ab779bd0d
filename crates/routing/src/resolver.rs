//! Effective configuration resolution.
//!
//! Precedence, highest first:
//!
//! 1. Tier selection: a pinned task always uses its own tier. Otherwise the
//!    plan decides (`FREE` → medium, `PRO`/`MAX` → high), and without a plan
//!    the task's default tier is used.
//! 2. A BYOK override with a non-empty model for that tier is returned as-is,
//!    absent fields defaulting to the gateway provider, 0.7 and 4096.
//! 3. The stored tier configuration. An unconfigured tier is an error; no
//!    default model is ever substituted.

use prepwise_core::error::RoutingError;
use prepwise_core::plan::PlanContext;
use prepwise_core::tier::{
    ByokConfig, ConfigSource, DEFAULT_MAX_TOKENS, DEFAULT_PROVIDER, DEFAULT_TEMPERATURE,
    EffectiveConfig, Tier,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::repository::TierConfigStore;
use crate::task_map::TaskTierMap;

pub struct TierConfigResolver {
    store: Arc<dyn TierConfigStore>,
    tasks: TaskTierMap,
}

impl TierConfigResolver {
    pub fn new(store: Arc<dyn TierConfigStore>) -> Self {
        Self {
            store,
            tasks: TaskTierMap::builtin(),
        }
    }

    pub fn with_tasks(mut self, tasks: TaskTierMap) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn tasks(&self) -> &TaskTierMap {
        &self.tasks
    }

    /// The tier a task runs on for the given plan.
    pub fn tier_for(&self, task: &str, plan: Option<&PlanContext>) -> Tier {
        let profile = self.tasks.profile(task);
        match plan {
            Some(ctx) if !profile.pinned => ctx.plan.default_tier(),
            _ => profile.tier,
        }
    }

    pub async fn resolve(
        &self,
        task: &str,
        byok: Option<&ByokConfig>,
        plan: Option<&PlanContext>,
    ) -> Result<EffectiveConfig, RoutingError> {
        let tier = self.tier_for(task, plan);

        if let Some(entry) = byok.and_then(|b| b.active_for(tier)) {
            debug!(task, %tier, model = %entry.model, "Using BYOK override");
            return Ok(EffectiveConfig {
                task: task.to_string(),
                tier,
                provider: entry
                    .provider
                    .clone()
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
                model: entry.model.clone(),
                fallback_model: entry.fallback.clone(),
                temperature: entry.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                max_tokens: entry.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                source: ConfigSource::Byok,
                api_key: entry.api_key.clone(),
            });
        }

        let config = self
            .store
            .get_tier_config(tier)
            .await
            .map_err(|e| RoutingError::Store(e.to_string()))?;

        let Some(model) = config.primary_model.filter(|m| !m.trim().is_empty()) else {
            warn!(task, %tier, "Tier has no primary model");
            return Err(RoutingError::TierNotConfigured {
                tier,
                task: task.to_string(),
            });
        };

        debug!(task, %tier, %model, "Resolved system tier configuration");
        Ok(EffectiveConfig {
            task: task.to_string(),
            tier,
            provider: config.provider,
            model,
            fallback_model: config.fallback_model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            source: ConfigSource::System,
            api_key: None,
        })
    }
}

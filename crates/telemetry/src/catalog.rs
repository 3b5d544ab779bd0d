//! Live model catalog: gateway pricing and tool-calling capability.
//!
//! Refreshed lazily from `Provider::list_models` once the cached copy is
//! older than the TTL. Lookups never fail: a missing or failed listing falls
//! back to the static [`PricingTable`], then to [`DEFAULT_PRICING`].

use chrono::Duration;
use prepwise_config::TelemetryConfig;
use prepwise_core::cache::RefreshCache;
use prepwise_core::clock::Clock;
use prepwise_core::provider::Provider;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::pricing::{DEFAULT_PRICING, ModelPricing, PricingTable};

/// Where a price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingSource {
    Custom,
    Live,
    Static,
    Default,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingRow {
    pub model: String,
    pub pricing: ModelPricing,
    pub source: PricingSource,
}

#[derive(Debug, Default)]
struct Catalog {
    prices: HashMap<String, ModelPricing>,
    tool_support: HashMap<String, bool>,
}

pub struct ModelPricingCache {
    source: Arc<dyn Provider>,
    cache: RefreshCache<Catalog>,
    fallback: PricingTable,
    custom: HashMap<String, ModelPricing>,
}

impl ModelPricingCache {
    pub fn new(source: Arc<dyn Provider>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            cache: RefreshCache::new("model_pricing", ttl, clock),
            fallback: PricingTable::with_defaults(),
            custom: HashMap::new(),
        }
    }

    pub fn from_config(source: Arc<dyn Provider>, config: &TelemetryConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = Duration::seconds(i64::try_from(config.pricing_ttl_secs).unwrap_or(i64::MAX));
        let mut cache = Self::new(source, ttl, clock);
        for (model, p) in &config.custom_pricing {
            cache = cache.with_custom(model, ModelPricing::new(p.input_per_m, p.output_per_m));
        }
        cache
    }

    /// Pin a price. Custom prices win over the live listing.
    pub fn with_custom(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.custom.insert(model.into(), pricing);
        self
    }

    /// Force the next read to refetch.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    async fn catalog(&self) -> Arc<Catalog> {
        let source = self.source.clone();
        let fetched = self
            .cache
            .get_with(|| async move {
                let models = source.list_models().await?;
                let mut catalog = Catalog::default();
                for model in models {
                    if let Some(p) = model.pricing {
                        catalog.prices.insert(
                            model.id.clone(),
                            ModelPricing::from_per_token(p.prompt_per_token, p.completion_per_token),
                        );
                    }
                    catalog.tool_support.insert(model.id, model.supports_tools);
                }
                debug!(models = catalog.prices.len(), "Model pricing refreshed");
                Ok::<_, prepwise_core::error::ProviderError>(catalog)
            })
            .await;

        match fetched {
            Ok(catalog) => catalog,
            Err(e) => {
                // Nothing cached yet: remember an empty catalog until the TTL
                // passes so every lookup doesn't hit the gateway again.
                warn!(error = %e, "Model listing unavailable; using static pricing");
                self.cache.store(Catalog::default())
            }
        }
    }

    /// Pricing and where it came from.
    pub async fn resolve(&self, model: &str) -> PricingRow {
        let (pricing, source) = if let Some(p) = self.custom.get(model) {
            (*p, PricingSource::Custom)
        } else if let Some(p) = self.catalog().await.prices.get(model) {
            (*p, PricingSource::Live)
        } else if let Some(p) = self.fallback.lookup(model) {
            (p, PricingSource::Static)
        } else {
            (DEFAULT_PRICING, PricingSource::Default)
        };
        PricingRow {
            model: model.to_string(),
            pricing,
            source,
        }
    }

    pub async fn pricing_for(&self, model: &str) -> ModelPricing {
        self.resolve(model).await.pricing
    }

    /// Estimated USD cost, rounded to 6 decimal places.
    pub async fn estimate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.pricing_for(model).await.cost(input_tokens, output_tokens)
    }

    /// Whether the gateway declares tool support for `model`. `None` when
    /// the model is not in the listing.
    pub async fn supports_tools(&self, model: &str) -> Option<bool> {
        self.catalog().await.tool_support.get(model).copied()
    }

    /// Every known price: live listing, then static table, custom on top.
    pub async fn rows(&self) -> Vec<PricingRow> {
        let catalog = self.catalog().await;
        let mut rows: HashMap<String, PricingRow> = HashMap::new();
        for (model, pricing) in self.fallback.entries() {
            rows.insert(model.clone(), PricingRow { model, pricing, source: PricingSource::Static });
        }
        for (model, pricing) in &catalog.prices {
            rows.insert(
                model.clone(),
                PricingRow {
                    model: model.clone(),
                    pricing: *pricing,
                    source: PricingSource::Live,
                },
            );
        }
        for (model, pricing) in &self.custom {
            rows.insert(
                model.clone(),
                PricingRow {
                    model: model.clone(),
                    pricing: *pricing,
                    source: PricingSource::Custom,
                },
            );
        }
        let mut rows: Vec<PricingRow> = rows.into_values().collect();
        rows.sort_by(|a, b| a.model.cmp(&b.model));
        rows
    }
}

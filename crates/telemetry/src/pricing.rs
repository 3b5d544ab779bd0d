//! Static pricing table for common gateway models.
//!
//! Prices are in USD per 1 million tokens. This table is the fallback used
//! when the live model listing is unavailable; custom pricing from config is
//! layered on top of it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

/// Applied to models nobody has a price for.
pub const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input_per_m: 1.0,
    output_per_m: 3.0,
};

impl ModelPricing {
    pub const fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Convert gateway per-token prices.
    pub fn from_per_token(prompt: f64, completion: f64) -> Self {
        Self::new(prompt * 1_000_000.0, completion * 1_000_000.0)
    }

    /// Cost in USD, rounded to 6 decimal places.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        round6(
            input_tokens as f64 / 1_000_000.0 * self.input_per_m
                + output_tokens as f64 / 1_000_000.0 * self.output_per_m,
        )
    }
}

pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

const BUILTIN_PRICES: &[(&str, f64, f64)] = &[
    // Anthropic
    ("anthropic/claude-sonnet-4", 3.0, 15.0),
    ("anthropic/claude-opus-4", 15.0, 75.0),
    ("anthropic/claude-3.5-haiku", 0.8, 4.0),
    // OpenAI
    ("openai/gpt-4o", 2.5, 10.0),
    ("openai/gpt-4o-mini", 0.15, 0.6),
    ("openai/gpt-4.1", 2.0, 8.0),
    ("openai/gpt-4.1-mini", 0.4, 1.6),
    ("openai/o3-mini", 1.1, 4.4),
    // Google
    ("google/gemini-2.0-flash", 0.1, 0.4),
    ("google/gemini-2.5-flash", 0.3, 2.5),
    ("google/gemini-2.5-pro", 1.25, 10.0),
    // Meta
    ("meta-llama/llama-3.1-70b-instruct", 0.52, 0.75),
    ("meta-llama/llama-3.1-8b-instruct", 0.055, 0.055),
    // Mistral
    ("mistralai/mistral-large", 2.0, 6.0),
    ("mistralai/mistral-small", 0.2, 0.6),
    // DeepSeek
    ("deepseek/deepseek-chat", 0.27, 1.1),
    ("deepseek/deepseek-r1", 0.55, 2.19),
];

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let prices = BUILTIN_PRICES
            .iter()
            .map(|(model, input, output)| (model.to_string(), ModelPricing::new(*input, *output)))
            .collect();
        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Exact lookup.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.read().get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model.into(), pricing);
    }

    /// Flexible lookup: exact match, then with a provider prefix
    /// (`gpt-4o` → `openai/gpt-4o`), then the longest known name that
    /// prefixes the model (`gpt-4o-mini-2024-07-18` → `gpt-4o-mini`).
    pub fn lookup(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.read();

        if let Some(p) = prices.get(model) {
            return Some(*p);
        }

        for prefix in ["openai", "anthropic", "google", "mistralai", "deepseek", "meta-llama"] {
            if let Some(p) = prices.get(&format!("{prefix}/{model}")) {
                return Some(*p);
            }
        }

        let model_lower = model.to_lowercase();
        let bare_model = model_lower.rsplit('/').next().unwrap_or(&model_lower);

        prices
            .iter()
            .filter_map(|(key, pricing)| {
                let bare_key = key.rsplit('/').next().unwrap_or(key).to_lowercase();
                bare_model
                    .starts_with(&bare_key)
                    .then_some((bare_key.len(), *pricing))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, pricing)| pricing)
    }

    /// Pricing for `model`, or the default row when unknown.
    pub fn price_for(&self, model: &str) -> ModelPricing {
        self.lookup(model).unwrap_or(DEFAULT_PRICING)
    }

    pub fn compute_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.price_for(model).cost(input_tokens, output_tokens)
    }

    /// All entries, sorted by model name.
    pub fn entries(&self) -> Vec<(String, ModelPricing)> {
        let mut entries: Vec<_> = self
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ModelPricing>> {
        self.prices.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

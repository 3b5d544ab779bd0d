//! Usage aggregates over generation log entries.

use prepwise_core::log::{GenerationLogEntry, LogStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::pricing::round6;

/// Cost breakdown for a single model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub calls: u64,
    pub errors: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub avg_latency_ms: u64,
}

/// Aggregated usage over a set of log entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_cost_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub calls: u64,
    pub errors: u64,
    /// Per-model breakdown, most expensive first.
    pub by_model: Vec<ModelUsage>,
}

impl UsageSummary {
    pub fn from_entries(entries: &[GenerationLogEntry]) -> Self {
        let mut by_model: HashMap<&str, (ModelUsage, u64)> = HashMap::new();
        let mut summary = Self::default();

        for entry in entries {
            let failed = entry.status == LogStatus::Error;
            let input = entry.token_usage.input as u64;
            let output = entry.token_usage.output as u64;

            summary.calls += 1;
            summary.errors += failed as u64;
            summary.total_input_tokens += input;
            summary.total_output_tokens += output;
            summary.total_cost_usd += entry.estimated_cost;

            let (usage, latency_total) = by_model.entry(entry.model.as_str()).or_insert_with(|| {
                (
                    ModelUsage {
                        model: entry.model.clone(),
                        ..ModelUsage::default()
                    },
                    0,
                )
            });
            usage.calls += 1;
            usage.errors += failed as u64;
            usage.input_tokens += input;
            usage.output_tokens += output;
            usage.cost_usd += entry.estimated_cost;
            *latency_total += entry.latency_ms;
        }

        summary.total_cost_usd = round6(summary.total_cost_usd);
        summary.by_model = by_model
            .into_values()
            .map(|(mut usage, latency_total)| {
                usage.cost_usd = round6(usage.cost_usd);
                usage.avg_latency_ms = latency_total / usage.calls.max(1);
                usage
            })
            .collect();
        summary.by_model.sort_by(|a, b| {
            b.cost_usd
                .total_cmp(&a.cost_usd)
                .then_with(|| a.model.cmp(&b.model))
        });
        summary
    }
}

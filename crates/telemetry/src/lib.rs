//! Observability for Prepwise generations.
//!
//! Every generation writes one audit entry with latency, token usage and an
//! estimated cost. Costs come from the live gateway catalog when available,
//! then the built-in price table, then a default row.

pub mod catalog;
pub mod logger;
pub mod pricing;
pub mod summary;

pub use catalog::{ModelPricingCache, PricingRow, PricingSource};
pub use logger::{GenerationSpan, Loggable, ObservabilityLogger};
pub use pricing::{DEFAULT_PRICING, ModelPricing, PricingTable};
pub use summary::{ModelUsage, UsageSummary};

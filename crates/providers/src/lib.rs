//! LLM provider implementations for Prepwise.
//!
//! All providers implement the `prepwise_core::Provider` trait. The router
//! picks the gateway for an effective configuration and wraps it with the
//! fallback-model policy and call timeout.

pub mod fallback;
pub mod openai_compat;
pub mod router;

pub use fallback::ModelFallbackProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};

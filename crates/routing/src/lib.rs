//! Tier configuration for Prepwise.
//!
//! Turns a task name plus the caller's plan and BYOK overrides into one
//! [`EffectiveConfig`](prepwise_core::tier::EffectiveConfig):
//!
//! - [`TaskTierMap`] knows each task's default tier and whether it is pinned
//! - [`TierConfigStore`] reads administrator-maintained per-tier settings
//! - [`TierConfigResolver`] applies the precedence rules

pub mod repository;
pub mod resolver;
pub mod task_map;

pub use repository::{CachedTierStore, SettingsTierRepository, TierConfigStore};
pub use resolver::TierConfigResolver;
pub use task_map::{TaskProfile, TaskTierMap};

//! # Prepwise Core
//!
//! Domain types, traits, and error definitions for the Prepwise generation
//! routing core. This crate has no framework dependencies: it defines the
//! model every other crate implements against.
//!
//! ## Layout
//!
//! Every external collaborator (model gateway, tool, persistence, clock) is a
//! trait here. Implementations live in their respective crates, so the
//! resolver, quota guard, and orchestration loop can all be tested against
//! in-memory stand-ins.

pub mod activity;
pub mod cache;
pub mod clock;
pub mod error;
pub mod event;
pub mod log;
pub mod message;
pub mod plan;
pub mod provider;
pub mod store;
pub mod tier;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use activity::{ActivityContent, ActivityKind};
pub use cache::RefreshCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    Error, GenerationError, ProviderError, Result, RoutingError, StoreError, ToolError,
};
pub use event::{DomainEvent, EventBus};
pub use log::{GenerationLogEntry, LogSink, LogStatus, TokenUsage};
pub use message::{Message, Role};
pub use plan::{Plan, PlanContext};
pub use provider::{
    ModelInfo, Provider, ProviderRequest, ProviderResponse, ResponseSchema, StreamChunk, Usage,
};
pub use store::{CounterStore, IncrementOutcome, SettingsStore};
pub use tier::{ByokConfig, ByokOverride, ConfigSource, EffectiveConfig, Tier, TierConfig};
pub use tool::{Tool, ToolCall, ToolContext, ToolDescriptor, ToolInvocation, ToolResult, ToolStatus};

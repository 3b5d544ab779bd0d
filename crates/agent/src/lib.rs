//! Generation pipelines for Prepwise.
//!
//! Three ways to call a model, all resolved through the tier router and
//! all recorded by the observability logger:
//!
//! 1. **Orchestration**: a bounded tool-calling loop for free-form answers
//! 2. **Structured**: one schema-validated activity in a single call
//! 3. **Streaming**: the same activity as a stream of partial objects
//!
//! [`GenerationService`] wires them to tier resolution and tool gating.

pub mod loop_runner;
pub mod partial;
pub mod request;
pub mod service;
pub mod stream_event;
pub mod streaming;
pub mod structured;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{DEFAULT_MAX_STEPS, OrchestrationLoop, OrchestrationOutput};
pub use partial::{PartialObjectAssembler, merge_monotonic, parse_complete, parse_partial};
pub use request::{GenerationRequest, system_prompt};
pub use service::{ActivityRequest, AskRequest, GenerationService};
pub use stream_event::GenerationEvent;
pub use streaming::{CancelHandle, GenerationStream, StreamingGenerator};
pub use structured::{StructuredGenerator, StructuredOutput};

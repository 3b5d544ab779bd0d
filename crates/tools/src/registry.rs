//! Tool registry and per-request tool sets.
//!
//! The registry holds every tool the process knows about. For each request it
//! derives a [`ToolSet`]: the tools that pass the plan gate, the admin
//! allow-list, and the model capability gate. The set is fixed for the
//! lifetime of the request so the advertised tool list always matches what
//! can execute.

use prepwise_core::event::{DomainEvent, EventBus};
use prepwise_core::plan::PlanContext;
use prepwise_core::provider::ToolDefinition;
use prepwise_core::tool::{Tool, ToolCall, ToolContext, ToolDescriptor, ToolInvocation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the resolved model declares about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub model_id: String,
    pub supports_tools: bool,
}

impl ModelCapabilities {
    pub fn new(model_id: impl Into<String>, supports_tools: bool) -> Self {
        Self {
            model_id: model_id.into(),
            supports_tools,
        }
    }
}

/// All registered tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same id replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.id() != tool.id());
        self.tools.push(tool);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.id() == id).cloned()
    }

    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The tools callable for one request.
    pub fn build(
        &self,
        plan: &PlanContext,
        enabled_tool_ids: &HashSet<String>,
        capabilities: &ModelCapabilities,
    ) -> ToolSet {
        if !capabilities.supports_tools {
            debug!(model = %capabilities.model_id, "Model has no tool support, tool set is empty");
            return ToolSet::empty();
        }

        let tools: Vec<Arc<dyn Tool>> = self
            .tools
            .iter()
            .filter(|t| t.descriptor().is_enabled_for_plan(plan.plan))
            .filter(|t| enabled_tool_ids.contains(t.id()))
            .cloned()
            .collect();

        debug!(
            plan = %plan.plan,
            model = %capabilities.model_id,
            tools = ?tools.iter().map(|t| t.id()).collect::<Vec<_>>(),
            "Built tool set"
        );
        ToolSet { tools }
    }
}

/// The outcome of one tool call: its terminal invocation record and the
/// text fed back to the model.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub invocation: ToolInvocation,
    pub content: String,
}

/// The immutable, per-request set of callable tools.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tools.iter().any(|t| t.id() == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.id()).collect()
    }

    /// Definitions advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| t.descriptor().to_definition())
            .collect()
    }

    /// Execute one call. Publishes `calling`, then exactly one of
    /// `complete`/`error`. Failures never escape: they become an error
    /// invocation and an error payload for the model.
    pub async fn invoke(&self, ctx: &ToolContext, call: ToolCall, events: &EventBus) -> ToolOutcome {
        events.publish(DomainEvent::ToolStatus {
            request_id: ctx.request_id.clone(),
            invocation: ToolInvocation::calling(&call),
        });

        let result = match self.tools.iter().find(|t| t.id() == call.name) {
            Some(tool) => tool.execute(ctx, call.arguments.clone()).await,
            None => Err(prepwise_core::error::ToolError::NotFound(call.name.clone())),
        };

        let outcome = match result {
            Ok(result) => {
                let output = result
                    .data
                    .clone()
                    .unwrap_or_else(|| serde_json::Value::String(result.output.clone()));
                debug!(tool = %call.name, call_id = %call.id, "Tool call complete");
                ToolOutcome {
                    invocation: ToolInvocation::complete(&call, output),
                    content: result.output,
                }
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                let message = e.to_string();
                ToolOutcome {
                    content: serde_json::json!({ "error": message }).to_string(),
                    invocation: ToolInvocation::failed(&call, message),
                }
            }
        };

        events.publish(DomainEvent::ToolStatus {
            request_id: ctx.request_id.clone(),
            invocation: outcome.invocation.clone(),
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSearchBackend, ctx, quota};
    use crate::{builtin_registry, search_web::SEARCH_WEB};
    use prepwise_config::ToolsConfig;
    use prepwise_core::plan::Plan;
    use prepwise_core::tool::ToolStatus;

    fn registry() -> ToolRegistry {
        builtin_registry(
            Arc::new(MockSearchBackend::default()),
            quota(5),
            &ToolsConfig::default(),
        )
    }

    fn all_enabled() -> HashSet<String> {
        prepwise_config::DEFAULT_TOOL_IDS
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn capable() -> ModelCapabilities {
        ModelCapabilities::new("openai/gpt-4o", true)
    }

    #[test]
    fn free_plan_gets_nothing() {
        let set = registry().build(&PlanContext::new(Plan::Free), &all_enabled(), &capable());
        assert!(set.is_empty());
    }

    #[test]
    fn free_plan_excludes_enabled_crawl() {
        let enabled: HashSet<String> = ["crawlWeb".to_string()].into();
        let set = registry().build(&PlanContext::new(Plan::Free), &enabled, &capable());
        assert!(!set.contains("crawlWeb"));
    }

    #[test]
    fn pro_and_max_gating() {
        let registry = registry();
        let pro = registry.build(&PlanContext::new(Plan::Pro), &all_enabled(), &capable());
        assert!(pro.contains("searchWeb"));
        assert!(pro.contains("crawlWeb"));
        assert!(pro.contains("analyzeTrends"));
        assert!(!pro.contains("findResources"));
        assert!(!pro.contains("generateSystemDesign"));

        let max = registry.build(&PlanContext::new(Plan::Max), &all_enabled(), &capable());
        assert_eq!(max.len(), 5);
    }

    #[test]
    fn admin_allow_list_is_anded() {
        let registry = registry();
        for plan in [Plan::Free, Plan::Pro, Plan::Max] {
            let enabled: HashSet<String> = ["searchWeb".to_string()].into();
            let set = registry.build(&PlanContext::new(plan), &enabled, &capable());
            for id in set.ids() {
                assert!(enabled.contains(id), "{id} not in allow-list");
            }
        }
        let none = registry.build(&PlanContext::new(Plan::Max), &HashSet::new(), &capable());
        assert!(none.is_empty());
    }

    #[test]
    fn no_tool_support_means_empty_set() {
        let registry = registry();
        for plan in [Plan::Free, Plan::Pro, Plan::Max] {
            let set = registry.build(
                &PlanContext::new(plan),
                &all_enabled(),
                &ModelCapabilities::new("some/small-model", false),
            );
            assert!(set.is_empty());
        }
    }

    #[test]
    fn definitions_match_set() {
        let set = registry().build(&PlanContext::new(Plan::Pro), &all_enabled(), &capable());
        let names: Vec<String> = set.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, set.ids());
    }

    #[test]
    fn register_replaces_same_id() {
        let mut registry = registry();
        let before = registry.len();
        registry.register(Arc::new(crate::search_web::SearchWebTool::new(
            Arc::new(MockSearchBackend::default()),
            1,
        )));
        assert_eq!(registry.len(), before);
        assert!(registry.get(SEARCH_WEB).is_some());
    }

    fn statuses(rx: &mut tokio::sync::broadcast::Receiver<Arc<DomainEvent>>) -> Vec<ToolStatus> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::ToolStatus { invocation, .. } = event.as_ref() {
                out.push(invocation.status);
            }
        }
        out
    }

    #[tokio::test]
    async fn invoke_emits_calling_then_complete() {
        let set = registry().build(&PlanContext::new(Plan::Pro), &all_enabled(), &capable());
        let events = EventBus::new(16);
        let mut rx = events.subscribe();

        let outcome = set
            .invoke(
                &ctx(Plan::Pro),
                ToolCall {
                    id: "c1".into(),
                    name: "searchWeb".into(),
                    arguments: serde_json::json!({"query": "raft consensus"}),
                },
                &events,
            )
            .await;

        assert_eq!(outcome.invocation.status, ToolStatus::Complete);
        assert!(outcome.content.contains("raft consensus"));
        assert_eq!(
            statuses(&mut rx),
            vec![ToolStatus::Calling, ToolStatus::Complete]
        );
    }

    #[tokio::test]
    async fn failures_become_error_payloads() {
        let set = registry().build(&PlanContext::new(Plan::Pro), &all_enabled(), &capable());
        let events = EventBus::new(16);
        let mut rx = events.subscribe();

        let outcome = set
            .invoke(
                &ctx(Plan::Pro),
                ToolCall {
                    id: "c2".into(),
                    name: "searchWeb".into(),
                    arguments: serde_json::json!({}),
                },
                &events,
            )
            .await;
        assert_eq!(outcome.invocation.status, ToolStatus::Error);
        let payload: serde_json::Value = serde_json::from_str(&outcome.content).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("query"));
        assert_eq!(
            statuses(&mut rx),
            vec![ToolStatus::Calling, ToolStatus::Error]
        );
    }

    #[tokio::test]
    async fn tools_outside_the_set_are_not_found() {
        let set = registry().build(&PlanContext::new(Plan::Pro), &all_enabled(), &capable());
        let outcome = set
            .invoke(
                &ctx(Plan::Pro),
                ToolCall {
                    id: "c3".into(),
                    name: "generateSystemDesign".into(),
                    arguments: serde_json::json!({"problem": "x"}),
                },
                &EventBus::default(),
            )
            .await;
        assert_eq!(outcome.invocation.status, ToolStatus::Error);
        assert!(outcome.invocation.error.unwrap().contains("not found"));
    }
}

//! System-design scaffold. Deterministic: no network, no model call.
//!
//! Produces a starting architecture the model can critique and extend,
//! shaped like a `system_design` activity.

use async_trait::async_trait;
use prepwise_core::activity::{ActivityContent, DesignComponent};
use prepwise_core::error::ToolError;
use prepwise_core::plan::Plan;
use prepwise_core::tool::{Tool, ToolContext, ToolDescriptor, ToolResult};

pub const GENERATE_SYSTEM_DESIGN: &str = "generateSystemDesign";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scale {
    Small,
    Medium,
    Large,
}

impl Scale {
    fn parse(s: Option<&str>) -> Result<Self, ToolError> {
        match s.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("medium") => Ok(Self::Medium),
            Some("small") => Ok(Self::Small),
            Some("large") => Ok(Self::Large),
            Some(other) => Err(ToolError::InvalidArguments(format!(
                "Unknown scale '{other}' (expected small, medium or large)"
            ))),
        }
    }
}

fn component(name: &str, responsibility: &str) -> DesignComponent {
    DesignComponent {
        name: name.into(),
        responsibility: responsibility.into(),
    }
}

/// Keyword-triggered components, checked against the lowercased problem.
const FEATURE_COMPONENTS: &[(&[&str], &str, &str)] = &[
    (
        &["chat", "realtime", "real-time", "live", "notification"],
        "WebSocket gateway",
        "Holds persistent client connections and pushes events",
    ),
    (
        &["search", "autocomplete", "typeahead"],
        "Search index",
        "Inverted index serving full-text and prefix queries",
    ),
    (
        &["upload", "image", "video", "photo", "file", "media"],
        "Object storage",
        "Durable blob storage for user-uploaded media",
    ),
    (
        &["feed", "timeline", "ranking", "recommend"],
        "Feed generator",
        "Precomputes per-user feeds from follow graph and ranking signals",
    ),
    (
        &["payment", "order", "checkout", "booking"],
        "Transaction service",
        "Idempotent writes with an outbox for downstream consumers",
    ),
    (
        &["url shortener", "shorten", "short link"],
        "ID generator",
        "Issues unique, compact keys without coordination on the hot path",
    ),
];

fn scaffold(problem: &str, scale: Scale, requirements: Vec<String>) -> ActivityContent {
    let lower = problem.to_ascii_lowercase();

    let mut components = vec![
        component("API service", "Stateless request handling, auth, validation"),
        component("Primary database", "System of record for core entities"),
    ];
    if scale != Scale::Small {
        components.insert(0, component("Load balancer", "Spreads traffic across API instances"));
        components.push(component("Cache", "Serves hot reads and absorbs read spikes"));
    }
    if scale == Scale::Large {
        components.push(component("Message queue", "Decouples writes from slow downstream work"));
        components.push(component("CDN", "Serves static and cacheable content at the edge"));
    }
    for (keywords, name, responsibility) in FEATURE_COMPONENTS {
        if keywords.iter().any(|k| lower.contains(k)) {
            components.push(component(name, responsibility));
        }
    }

    let mut tradeoffs = vec![
        "SQL gives strong consistency and joins; a partitioned NoSQL store scales writes more easily".to_string(),
    ];
    if scale != Scale::Small {
        tradeoffs.push("Cache-aside is simple but risks stale reads; pick TTLs per entity".into());
    }
    if scale == Scale::Large {
        tradeoffs.push("Async processing through the queue improves latency at the cost of eventual consistency".into());
        tradeoffs.push("Sharding by user id keeps per-user queries local but makes global queries expensive".into());
    }

    let requirements = if requirements.is_empty() {
        vec![
            "Define functional requirements (core user actions)".into(),
            "Estimate read/write QPS and storage growth".into(),
            "Set availability and latency targets".into(),
        ]
    } else {
        requirements
    };

    ActivityContent::SystemDesign {
        title: format!("Design: {problem}"),
        problem: problem.to_string(),
        requirements,
        components,
        tradeoffs,
    }
}

pub struct GenerateSystemDesignTool {
    descriptor: ToolDescriptor,
}

impl GenerateSystemDesignTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: GENERATE_SYSTEM_DESIGN.into(),
                display_name: "Sketching a system design".into(),
                description: "Produce a baseline architecture (components, requirements, tradeoffs) for a system-design interview problem.".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "problem": {
                            "type": "string",
                            "description": "The system to design, e.g. \"a URL shortener\""
                        },
                        "scale": {
                            "type": "string",
                            "enum": ["small", "medium", "large"]
                        },
                        "requirements": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    },
                    "required": ["problem"]
                }),
                min_plan: Plan::Max,
                requires_quota: false,
            },
        }
    }
}

impl Default for GenerateSystemDesignTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GenerateSystemDesignTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let problem = arguments["problem"]
            .as_str()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'problem' argument".into()))?;
        let scale = Scale::parse(arguments["scale"].as_str())?;
        let requirements = arguments["requirements"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let design = scaffold(problem, scale, requirements);
        let data = serde_json::to_value(&design).map_err(|e| ToolError::ExecutionFailed {
            tool_id: GENERATE_SYSTEM_DESIGN.into(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::from_data(data))
    }
}

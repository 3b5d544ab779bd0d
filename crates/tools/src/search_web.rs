//! Web search tool.

use async_trait::async_trait;
use prepwise_core::error::ToolError;
use prepwise_core::plan::Plan;
use prepwise_core::tool::{Tool, ToolContext, ToolDescriptor, ToolResult};
use std::sync::Arc;

use crate::backend::SearchBackend;

pub const SEARCH_WEB: &str = "searchWeb";

pub struct SearchWebTool {
    backend: Arc<dyn SearchBackend>,
    max_results: usize,
    descriptor: ToolDescriptor,
}

impl SearchWebTool {
    pub fn new(backend: Arc<dyn SearchBackend>, max_results: usize) -> Self {
        Self {
            backend,
            max_results: max_results.max(1),
            descriptor: ToolDescriptor {
                id: SEARCH_WEB.into(),
                display_name: "Searching the web".into(),
                description: "Search the web for up-to-date information. Returns ranked results with titles, URLs, and snippets.".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Number of results to return",
                            "minimum": 1
                        }
                    },
                    "required": ["query"]
                }),
                min_plan: Plan::Pro,
                requires_quota: false,
            },
        }
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let limit = arguments["limit"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(self.max_results)
            .clamp(1, self.max_results);

        let results = self.backend.search(query, limit).await?;

        Ok(ToolResult::from_data(serde_json::json!({
            "queries": [query],
            "results": results,
        })))
    }
}

//! Trend analysis: fans out a few related searches and merges the sources.

use async_trait::async_trait;
use futures::future::join_all;
use prepwise_core::error::ToolError;
use prepwise_core::plan::Plan;
use prepwise_core::tool::{Tool, ToolContext, ToolDescriptor, ToolResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::backend::{SearchBackend, SearchHit};

pub const ANALYZE_TRENDS: &str = "analyzeTrends";

pub struct AnalyzeTrendsTool {
    backend: Arc<dyn SearchBackend>,
    per_query: usize,
    descriptor: ToolDescriptor,
}

impl AnalyzeTrendsTool {
    pub fn new(backend: Arc<dyn SearchBackend>, per_query: usize) -> Self {
        Self {
            backend,
            per_query: per_query.max(1),
            descriptor: ToolDescriptor {
                id: ANALYZE_TRENDS.into(),
                display_name: "Analyzing industry trends".into(),
                description: "Research current industry and hiring trends for a topic: in-demand skills, adoption, and what interviewers are asking about.".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "topic": {
                            "type": "string",
                            "description": "Technology, role, or skill area"
                        },
                        "timeframe": {
                            "type": "string",
                            "description": "Period of interest, e.g. \"2026\" or \"last 6 months\""
                        }
                    },
                    "required": ["topic"]
                }),
                min_plan: Plan::Pro,
                requires_quota: false,
            },
        }
    }
}

fn trend_queries(topic: &str, timeframe: &str) -> Vec<String> {
    vec![
        format!("{topic} industry trends {timeframe}"),
        format!("{topic} in-demand skills {timeframe}"),
        format!("{topic} interview questions {timeframe}"),
    ]
}

#[async_trait]
impl Tool for AnalyzeTrendsTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let topic = arguments["topic"]
            .as_str()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'topic' argument".into()))?;
        let timeframe = arguments["timeframe"]
            .as_str()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .unwrap_or_else(|| chrono::Utc::now().format("%Y").to_string());

        let queries = trend_queries(topic, &timeframe);
        let outcomes = join_all(
            queries
                .iter()
                .map(|q| self.backend.search(q, self.per_query)),
        )
        .await;

        let mut seen = HashSet::new();
        let mut sources: Vec<SearchHit> = Vec::new();
        let mut failures = 0;
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(hits) => sources.extend(hits.into_iter().filter(|h| seen.insert(h.url.clone()))),
                Err(e) => {
                    failures += 1;
                    warn!(query = %query, error = %e, "Trend search failed");
                }
            }
        }

        if failures == queries.len() {
            return Err(ToolError::ExecutionFailed {
                tool_id: ANALYZE_TRENDS.into(),
                reason: "every trend search failed".into(),
            });
        }

        Ok(ToolResult::from_data(serde_json::json!({
            "topic": topic,
            "timeframe": timeframe,
            "queries": queries,
            "sources": sources,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSearchBackend, ctx};

    #[tokio::test]
    async fn merges_sources_across_queries() {
        let tool = AnalyzeTrendsTool::new(Arc::new(MockSearchBackend::default()), 2);
        let result = tool
            .execute(
                &ctx(Plan::Pro),
                serde_json::json!({"topic": "Kubernetes", "timeframe": "2026"}),
            )
            .await
            .unwrap();

        let data = result.data.unwrap();
        let queries = data["queries"].as_array().unwrap();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0], "Kubernetes industry trends 2026");
        // 3 queries x 2 distinct urls each
        assert_eq!(data["sources"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn duplicate_urls_are_collapsed() {
        let backend = Arc::new(MockSearchBackend::with_fixed_urls());
        let tool = AnalyzeTrendsTool::new(backend, 3);
        let result = tool
            .execute(&ctx(Plan::Pro), serde_json::json!({"topic": "Rust"}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["sources"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn all_searches_failing_is_an_error() {
        let tool = AnalyzeTrendsTool::new(Arc::new(MockSearchBackend::failing()), 3);
        let err = tool
            .execute(&ctx(Plan::Pro), serde_json::json!({"topic": "Go"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[test]
    fn default_timeframe_is_current_year() {
        let year = chrono::Utc::now().format("%Y").to_string();
        let queries = trend_queries("SQL", &year);
        assert!(queries.iter().all(|q| q.ends_with(&year)));
    }
}

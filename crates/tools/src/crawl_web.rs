//! Page crawl tool. Metered against the per-user crawl quota.
//!
//! The quota is checked before the crawl and charged only after the page
//! came back, so failed or timed-out crawls are free. An exhausted quota is
//! not an error: the tool returns the quota payload so the model can carry
//! on with search results alone.

use async_trait::async_trait;
use prepwise_core::error::ToolError;
use prepwise_core::plan::Plan;
use prepwise_core::tool::{Tool, ToolContext, ToolDescriptor, ToolResult};
use prepwise_quota::QuotaGuard;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::backend::{SearchBackend, check_url};

pub const CRAWL_WEB: &str = "crawlWeb";

/// Markdown beyond this many characters is cut before it reaches the model.
const MAX_PAGE_CHARS: usize = 12_000;

pub struct CrawlWebTool {
    backend: Arc<dyn SearchBackend>,
    quota: Arc<QuotaGuard>,
    timeout: Duration,
    descriptor: ToolDescriptor,
}

impl CrawlWebTool {
    pub fn new(backend: Arc<dyn SearchBackend>, quota: Arc<QuotaGuard>, timeout: Duration) -> Self {
        Self {
            backend,
            quota,
            timeout,
            descriptor: ToolDescriptor {
                id: CRAWL_WEB.into(),
                display_name: "Reading a web page".into(),
                description: "Fetch a web page and return its main content as markdown. Use after searchWeb to read a promising result in full.".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "Absolute http(s) URL of the page to read"
                        }
                    },
                    "required": ["url"]
                }),
                min_plan: Plan::Pro,
                requires_quota: true,
            },
        }
    }
}

fn truncate(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text, false),
    }
}

#[async_trait]
impl Tool for CrawlWebTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let url = arguments["url"]
            .as_str()
            .map(str::trim)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;
        check_url(url)?;

        let quota_failed = |e: prepwise_core::error::StoreError| ToolError::ExecutionFailed {
            tool_id: CRAWL_WEB.into(),
            reason: format!("quota unavailable: {e}"),
        };

        let decision = self
            .quota
            .check(&ctx.user_id, ctx.plan, 1)
            .await
            .map_err(quota_failed)?;
        if !decision.allowed {
            info!(user_id = %ctx.user_id, url, "Crawl skipped, quota exhausted");
            return Ok(ToolResult::from_data(serde_json::json!({
                "url": url,
                "skipped": true,
                "quota": decision,
            })));
        }

        let page = tokio::time::timeout(self.timeout, self.backend.scrape(url))
            .await
            .map_err(|_| ToolError::Timeout {
                tool_id: CRAWL_WEB.into(),
                timeout_secs: self.timeout.as_secs(),
            })??;

        let charged = self
            .quota
            .consume(&ctx.user_id, ctx.plan, 1)
            .await
            .map_err(quota_failed)?;
        if !charged.allowed {
            // A concurrent crawl took the last unit between check and consume.
            warn!(user_id = %ctx.user_id, url, "Crawl completed but quota was exhausted concurrently");
        }

        let (markdown, truncated) = truncate(page.markdown, MAX_PAGE_CHARS);
        Ok(ToolResult::from_data(serde_json::json!({
            "url": page.url,
            "title": page.title,
            "description": page.description,
            "markdown": markdown,
            "truncated": truncated,
            "quota": charged,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSearchBackend, ctx, quota};

    fn tool(backend: Arc<MockSearchBackend>, limit: u64) -> (CrawlWebTool, Arc<QuotaGuard>) {
        let guard = quota(limit);
        (
            CrawlWebTool::new(backend, guard.clone(), Duration::from_millis(200)),
            guard,
        )
    }

    #[tokio::test]
    async fn successful_crawl_consumes_one_unit() {
        let backend = Arc::new(MockSearchBackend::default());
        let (tool, guard) = tool(backend.clone(), 5);
        let result = tool
            .execute(&ctx(Plan::Pro), serde_json::json!({"url": "https://example.com/a"}))
            .await
            .unwrap();

        let data = result.data.unwrap();
        assert_eq!(data["url"], "https://example.com/a");
        assert_eq!(data["quota"]["remaining"], 4);
        assert_eq!(guard.record("user-1", Plan::Pro).await.unwrap().used, 1);
        assert_eq!(backend.scrape_count(), 1);
    }

    #[tokio::test]
    async fn failed_crawl_is_not_charged() {
        let backend = Arc::new(MockSearchBackend::default());
        let (tool, guard) = tool(backend, 5);
        let err = tool
            .execute(&ctx(Plan::Pro), serde_json::json!({"url": "https://fail.example.com"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
        assert_eq!(guard.record("user-1", Plan::Pro).await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn slow_crawl_times_out_uncharged() {
        let backend = Arc::new(MockSearchBackend::default());
        let (tool, guard) = tool(backend, 5);
        let err = tool
            .execute(&ctx(Plan::Pro), serde_json::json!({"url": "https://slow.example.com"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert_eq!(guard.record("user-1", Plan::Pro).await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn exhausted_quota_returns_structured_payload() {
        let backend = Arc::new(MockSearchBackend::default());
        let (tool, guard) = tool(backend.clone(), 1);
        guard.consume("user-1", Plan::Pro, 1).await.unwrap();

        let result = tool
            .execute(&ctx(Plan::Pro), serde_json::json!({"url": "https://example.com"}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["skipped"], true);
        assert_eq!(data["quota"]["allowed"], false);
        assert_eq!(data["quota"]["remaining"], 0);
        assert_eq!(data["quota"]["limit"], 1);
        assert_eq!(backend.scrape_count(), 0);
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let (tool, _) = tool(Arc::new(MockSearchBackend::default()), 5);
        let err = tool
            .execute(&ctx(Plan::Pro), serde_json::json!({"url": "file:///etc/hosts"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let (text, cut) = truncate("héllo wörld".into(), 4);
        assert_eq!(text, "héll");
        assert!(cut);
        let (text, cut) = truncate("short".into(), 10);
        assert_eq!(text, "short");
        assert!(!cut);
    }

    #[test]
    fn descriptor_is_metered() {
        let (tool, _) = tool(Arc::new(MockSearchBackend::default()), 5);
        assert!(tool.descriptor().requires_quota);
        assert!(!tool.descriptor().is_enabled_for_plan(Plan::Free));
    }
}

//! Tool catalog and tool gating for Prepwise.
//!
//! Tools let the model reach outside the conversation mid-generation:
//! search the web, read a page, research trends, find learning resources,
//! and sketch a system design. [`ToolRegistry::build`] narrows the catalog
//! to what a given request may call.

pub mod allow_list;
pub mod analyze_trends;
pub mod backend;
pub mod crawl_web;
pub mod find_resources;
pub mod registry;
pub mod search_web;
pub mod system_design;

use prepwise_config::ToolsConfig;
use prepwise_quota::QuotaGuard;
use std::sync::Arc;
use std::time::Duration;

pub use allow_list::{TOOLS_ENABLED_KEY, load_enabled_tool_ids, save_enabled_tool_ids};
pub use backend::{HttpSearchBackend, ScrapedPage, SearchBackend, SearchHit};
pub use registry::{ModelCapabilities, ToolOutcome, ToolRegistry, ToolSet};

/// Tools whose inputs are search queries worth recording in the audit log.
pub const SEARCH_TOOL_IDS: [&str; 3] = [
    search_web::SEARCH_WEB,
    analyze_trends::ANALYZE_TRENDS,
    find_resources::FIND_RESOURCES,
];

/// Create a registry with every built-in tool.
///
/// `quota` meters `crawlWeb`; the other tools are free to call.
pub fn builtin_registry(
    backend: Arc<dyn SearchBackend>,
    quota: Arc<QuotaGuard>,
    config: &ToolsConfig,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(search_web::SearchWebTool::new(
        backend.clone(),
        config.max_search_results,
    )));
    registry.register(Arc::new(crawl_web::CrawlWebTool::new(
        backend.clone(),
        quota,
        Duration::from_secs(config.crawl_timeout_secs),
    )));
    registry.register(Arc::new(analyze_trends::AnalyzeTrendsTool::new(
        backend.clone(),
        config.max_search_results,
    )));
    registry.register(Arc::new(find_resources::FindResourcesTool::new(
        backend,
        config.max_search_results,
    )));
    registry.register(Arc::new(system_design::GenerateSystemDesignTool::new()));
    registry
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use prepwise_config::{QuotaConfig, QuotaLimits, QuotaPeriod};
    use prepwise_core::error::ToolError;
    use prepwise_core::plan::Plan;
    use prepwise_core::tool::ToolContext;
    use prepwise_store::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic backend. Scraping a host containing "fail" errors,
    /// one containing "slow" hangs.
    #[derive(Default)]
    pub struct MockSearchBackend {
        fixed_urls: bool,
        failing: bool,
        scrapes: AtomicUsize,
    }

    impl MockSearchBackend {
        pub fn with_fixed_urls() -> Self {
            Self {
                fixed_urls: true,
                ..Self::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        pub fn scrape_count(&self) -> usize {
            self.scrapes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchBackend for MockSearchBackend {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError> {
            if self.failing {
                return Err(ToolError::ExecutionFailed {
                    tool_id: "searchWeb".into(),
                    reason: "backend down".into(),
                });
            }
            let slug = query.replace(' ', "-");
            Ok((0..limit.min(3))
                .map(|i| SearchHit {
                    title: format!("Result {} for: {query}", i + 1),
                    url: if self.fixed_urls {
                        format!("https://fixed.example.com/{i}")
                    } else {
                        format!("https://example.com/{slug}/{i}")
                    },
                    snippet: format!("About {query}"),
                })
                .collect())
        }

        async fn scrape(&self, url: &str) -> Result<ScrapedPage, ToolError> {
            if url.contains("slow") {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if url.contains("fail") {
                return Err(ToolError::ExecutionFailed {
                    tool_id: "crawlWeb".into(),
                    reason: "404".into(),
                });
            }
            self.scrapes.fetch_add(1, Ordering::SeqCst);
            Ok(ScrapedPage {
                url: url.to_string(),
                title: Some("Example".into()),
                description: None,
                markdown: "# Example\nSome content".into(),
            })
        }
    }

    pub fn ctx(plan: Plan) -> ToolContext {
        ToolContext {
            request_id: "req-1".into(),
            user_id: "user-1".into(),
            plan,
        }
    }

    pub fn quota(pro_limit: u64) -> Arc<QuotaGuard> {
        Arc::new(QuotaGuard::new(
            Arc::new(InMemoryStore::new()),
            "crawl",
            &QuotaConfig {
                period: QuotaPeriod::Daily,
                limits: QuotaLimits {
                    free: 0,
                    pro: pro_limit,
                    max: pro_limit * 5,
                },
            },
        ))
    }
}

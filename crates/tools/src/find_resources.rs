//! Learning-resource finder.

use async_trait::async_trait;
use prepwise_core::error::ToolError;
use prepwise_core::plan::Plan;
use prepwise_core::tool::{Tool, ToolContext, ToolDescriptor, ToolResult};
use serde::Serialize;
use std::sync::Arc;

use crate::backend::{SearchBackend, SearchHit};

pub const FIND_RESOURCES: &str = "findResources";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Docs,
    Course,
    Video,
    Book,
    Article,
}

impl ResourceKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docs" | "documentation" => Some(Self::Docs),
            "course" | "courses" => Some(Self::Course),
            "video" | "videos" => Some(Self::Video),
            "book" | "books" => Some(Self::Book),
            "article" | "articles" => Some(Self::Article),
            _ => None,
        }
    }

    fn query_hint(&self) -> &'static str {
        match self {
            Self::Docs => "official documentation",
            Self::Course => "online course",
            Self::Video => "video tutorial",
            Self::Book => "book",
            Self::Article => "tutorial article",
        }
    }

    /// Best-effort classification from the URL host and path.
    fn classify(url: &str) -> Self {
        let url = url.to_ascii_lowercase();
        if url.contains("youtube.com") || url.contains("youtu.be") || url.contains("vimeo.com") {
            Self::Video
        } else if ["coursera.org", "udemy.com", "edx.org", "pluralsight.com", "educative.io"]
            .iter()
            .any(|h| url.contains(h))
        {
            Self::Course
        } else if url.contains("oreilly.com") || url.contains("manning.com") || url.contains("/book") {
            Self::Book
        } else if url.contains("://docs.") || url.contains("/docs") || url.contains("documentation") {
            Self::Docs
        } else {
            Self::Article
        }
    }
}

#[derive(Debug, Serialize)]
struct Resource {
    kind: ResourceKind,
    #[serde(flatten)]
    hit: SearchHit,
}

pub struct FindResourcesTool {
    backend: Arc<dyn SearchBackend>,
    max_results: usize,
    descriptor: ToolDescriptor,
}

impl FindResourcesTool {
    pub fn new(backend: Arc<dyn SearchBackend>, max_results: usize) -> Self {
        Self {
            backend,
            max_results: max_results.max(1),
            descriptor: ToolDescriptor {
                id: FIND_RESOURCES.into(),
                display_name: "Finding learning resources".into(),
                description: "Find high-quality learning resources (docs, courses, videos, books, articles) for a topic.".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "topic": {
                            "type": "string",
                            "description": "What the learner wants to study"
                        },
                        "kind": {
                            "type": "string",
                            "enum": ["docs", "course", "video", "book", "article"],
                            "description": "Restrict to one kind of resource"
                        }
                    },
                    "required": ["topic"]
                }),
                min_plan: Plan::Max,
                requires_quota: false,
            },
        }
    }
}

#[async_trait]
impl Tool for FindResourcesTool {
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

        let wanted = match arguments["kind"].as_str() {
            Some(k) => Some(ResourceKind::parse(k).ok_or_else(|| {
                ToolError::InvalidArguments(format!("Unknown resource kind '{k}'"))
            })?),
            None => None,
        };

        let query = match wanted {
            Some(kind) => format!("{topic} {}", kind.query_hint()),
            None => format!("best resources to learn {topic}"),
        };

        let hits = self.backend.search(&query, self.max_results).await?;
        let resources: Vec<Resource> = hits
            .into_iter()
            .map(|hit| Resource {
                kind: wanted.unwrap_or_else(|| ResourceKind::classify(&hit.url)),
                hit,
            })
            .collect();

        Ok(ToolResult::from_data(serde_json::json!({
            "topic": topic,
            "queries": [query],
            "resources": resources,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSearchBackend, ctx};

    #[test]
    fn classify_by_host() {
        assert_eq!(
            ResourceKind::classify("https://www.youtube.com/watch?v=x"),
            ResourceKind::Video
        );
        assert_eq!(
            ResourceKind::classify("https://www.coursera.org/learn/x"),
            ResourceKind::Course
        );
        assert_eq!(
            ResourceKind::classify("https://docs.python.org/3/"),
            ResourceKind::Docs
        );
        assert_eq!(
            ResourceKind::classify("https://doc.rust-lang.org/book/"),
            ResourceKind::Book
        );
        assert_eq!(
            ResourceKind::classify("https://blog.example.com/post"),
            ResourceKind::Article
        );
    }

    #[tokio::test]
    async fn kind_filter_shapes_query() {
        let tool = FindResourcesTool::new(Arc::new(MockSearchBackend::default()), 3);
        let result = tool
            .execute(
                &ctx(Plan::Max),
                serde_json::json!({"topic": "distributed systems", "kind": "video"}),
            )
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["queries"][0], "distributed systems video tutorial");
        assert!(
            data["resources"]
                .as_array()
                .unwrap()
                .iter()
                .all(|r| r["kind"] == "video")
        );
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let tool = FindResourcesTool::new(Arc::new(MockSearchBackend::default()), 3);
        let err = tool
            .execute(
                &ctx(Plan::Max),
                serde_json::json!({"topic": "rust", "kind": "podcast"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn max_only() {
        let tool = FindResourcesTool::new(Arc::new(MockSearchBackend::default()), 3);
        assert!(!tool.descriptor().is_enabled_for_plan(Plan::Pro));
        assert!(tool.descriptor().is_enabled_for_plan(Plan::Max));
    }
}

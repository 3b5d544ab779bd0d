//! Search and crawl backend.
//!
//! The search tools only need two operations from the outside world:
//! "query → ranked snippets" and "url → extracted markdown + metadata".
//! [`HttpSearchBackend`] speaks the Firecrawl-style REST API
//! (`POST /v1/search`, `POST /v1/scrape`).

use async_trait::async_trait;
use prepwise_config::ToolsConfig;
use prepwise_core::error::ToolError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// A crawled page reduced to markdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub markdown: String,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError>;

    async fn scrape(&self, url: &str) -> Result<ScrapedPage, ToolError>;
}

/// Only absolute http(s) URLs may be crawled.
pub fn check_url(url: &str) -> Result<(), ToolError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            ToolError::InvalidArguments(format!("Only http:// and https:// URLs can be crawled: {url}"))
        })?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ToolError::InvalidArguments(format!("URL has no host: {url}")));
    }
    Ok(())
}

pub struct HttpSearchBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSearchBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(
            &config.search_api_url,
            config.search_api_key.clone(),
            Duration::from_secs(config.crawl_timeout_secs),
        )
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        tool_id: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ToolError> {
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_id: tool_id.to_string(),
            reason,
        };

        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                failed("search backend timed out".into())
            } else {
                failed(format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(failed(format!("search backend returned {status}: {text}")));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| failed(format!("Malformed backend response: {e}")))?;
        match (envelope.success, envelope.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(failed(
                envelope
                    .error
                    .unwrap_or_else(|| "backend reported failure".into()),
            )),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct WireHit {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct WirePage {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    metadata: Option<WireMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "sourceURL")]
    source_url: Option<String>,
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError> {
        debug!(query, limit, "Searching");
        let hits: Vec<WireHit> = self
            .post(
                "searchWeb",
                "/v1/search",
                serde_json::json!({ "query": query, "limit": limit }),
            )
            .await?;
        Ok(hits
            .into_iter()
            .take(limit)
            .map(|h| SearchHit {
                title: h.title.unwrap_or_else(|| h.url.clone()),
                url: h.url,
                snippet: h.description.unwrap_or_default(),
            })
            .collect())
    }

    async fn scrape(&self, url: &str) -> Result<ScrapedPage, ToolError> {
        check_url(url)?;
        debug!(url, "Scraping");
        let page: WirePage = self
            .post(
                "crawlWeb",
                "/v1/scrape",
                serde_json::json!({ "url": url, "formats": ["markdown"] }),
            )
            .await?;
        let metadata = page.metadata;
        Ok(ScrapedPage {
            url: metadata
                .as_ref()
                .and_then(|m| m.source_url.clone())
                .unwrap_or_else(|| url.to_string()),
            title: metadata.as_ref().and_then(|m| m.title.clone()),
            description: metadata.and_then(|m| m.description),
            markdown: page.markdown.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_checks() {
        assert!(check_url("https://doc.rust-lang.org/book/").is_ok());
        assert!(check_url("http://example.com").is_ok());
        assert!(check_url("file:///etc/passwd").is_err());
        assert!(check_url("ftp://example.com").is_err());
        assert!(check_url("https://").is_err());
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let backend = HttpSearchBackend::new("https://api.example.com/", None, Duration::from_secs(1));
        assert_eq!(backend.base_url, "https://api.example.com");
    }

    #[test]
    fn empty_key_is_dropped() {
        let backend =
            HttpSearchBackend::new("https://api.example.com", Some(String::new()), Duration::from_secs(1));
        assert!(backend.api_key.is_none());
    }

    #[test]
    fn scrape_envelope_parses() {
        let raw = r##"{
            "success": true,
            "data": {
                "markdown": "# Title\nBody",
                "metadata": {"title": "Title", "sourceURL": "https://example.com/a"}
            }
        }"##;
        let envelope: Envelope<WirePage> = serde_json::from_str(raw).unwrap();
        assert!(envelope.success);
        let page = envelope.data.unwrap();
        assert_eq!(page.markdown.as_deref(), Some("# Title\nBody"));
        assert_eq!(
            page.metadata.unwrap().source_url.as_deref(),
            Some("https://example.com/a")
        );
    }

    #[test]
    fn failure_envelope_carries_error() {
        let raw = r#"{"success": false, "error": "Insufficient credits"}"#;
        let envelope: Envelope<Vec<WireHit>> = serde_json::from_str(raw).unwrap();
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.error.as_deref(), Some("Insufficient credits"));
    }
}

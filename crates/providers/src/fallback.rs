//! Model fallback with a per-call timeout.
//!
//! Wraps a provider and retries a failed call once against the tier's
//! fallback model, but only when the provider reports that the requested
//! model itself is unavailable (`ModelNotFound`, 404, 5xx). Rate limits,
//! timeouts, auth failures and everything else surface immediately so the
//! caller sees them; there are no other retries.

use async_trait::async_trait;
use prepwise_core::error::ProviderError;
use prepwise_core::provider::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default timeout applied to every provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);

pub struct ModelFallbackProvider {
    inner: Arc<dyn Provider>,
    fallback_model: Option<String>,
    timeout: Duration,
}

impl ModelFallbackProvider {
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            inner,
            fallback_model: None,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_fallback_model(mut self, model: Option<String>) -> Self {
        self.fallback_model = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn timed<T, F>(&self, model: &str, call: F) -> std::result::Result<T, ProviderError>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    provider = %self.inner.name(),
                    model,
                    timeout_secs = self.timeout.as_secs(),
                    "Provider call timed out"
                );
                Err(ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}s",
                    self.inner.name(),
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// The request to retry with, if `error` qualifies for fallback.
    fn fallback_request(
        &self,
        request: &ProviderRequest,
        error: &ProviderError,
    ) -> Option<ProviderRequest> {
        let fallback = self.fallback_model.as_ref()?;
        if !error.is_model_unavailable() || *fallback == request.model {
            return None;
        }
        info!(
            provider = %self.inner.name(),
            primary = %request.model,
            fallback = %fallback,
            error = %error,
            "Primary model unavailable, retrying with fallback model"
        );
        let mut retry = request.clone();
        retry.model = fallback.clone();
        Some(retry)
    }
}

#[async_trait]
impl Provider for ModelFallbackProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let err = match self
            .timed(&request.model, self.inner.complete(request.clone()))
            .await
        {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        match self.fallback_request(&request, &err) {
            Some(retry) => {
                let model = retry.model.clone();
                self.timed(&model, self.inner.complete(retry)).await
            }
            None => Err(err),
        }
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let err = match self
            .timed(&request.model, self.inner.stream(request.clone()))
            .await
        {
            Ok(rx) => return Ok(rx),
            Err(e) => e,
        };

        match self.fallback_request(&request, &err) {
            Some(retry) => {
                let model = retry.model.clone();
                self.timed(&model, self.inner.stream(retry)).await
            }
            None => Err(err),
        }
    }

    async fn list_models(&self) -> std::result::Result<Vec<ModelInfo>, ProviderError> {
        self.inner.list_models().await
    }
}

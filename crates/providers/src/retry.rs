//! Retrying provider: bounded exponential backoff on transient errors.
//!
//! Retries live here, inside the model client boundary. Callers only ever
//! see a success or a terminal failure.

use async_trait::async_trait;
use chatdesk_core::error::ProviderError;
use chatdesk_core::provider::{ModelRequest, ModelResponse, Provider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): `initial * 2^(retry-1)`,
    /// capped at `max_backoff_ms`.
    pub fn backoff_ms(&self, retry: u32) -> u64 {
        let cap = self.max_backoff_ms.max(self.initial_backoff_ms);
        let shift = retry.saturating_sub(1).min(20);
        let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        self.initial_backoff_ms.saturating_mul(factor).min(cap)
    }

    /// Backoff for `retry`, raised toward a server-requested delay but never
    /// past the cap.
    fn wait_for(&self, retry: u32, err: &ProviderError) -> Duration {
        let mut wait = self.backoff_ms(retry);
        if let ProviderError::RateLimited { retry_after_secs } = err {
            let cap = self.max_backoff_ms.max(self.initial_backoff_ms);
            wait = wait.max(retry_after_secs.saturating_mul(1000).min(cap));
        }
        Duration::from_millis(wait)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4000,
        }
    }
}

/// Wraps a provider and retries its transient failures.
pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn generate(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        let mut retry = 0u32;
        loop {
            match self.inner.generate(request.clone()).await {
                Ok(response) => {
                    if retry > 0 {
                        info!(provider = %self.inner.name(), retries = retry, "Provider recovered after retry");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transient() && retry < self.policy.max_retries => {
                    retry += 1;
                    let wait = self.policy.wait_for(retry, &e);
                    warn!(
                        provider = %self.inner.name(),
                        retry,
                        max_retries = self.policy.max_retries,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Transient provider error, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(provider = %self.inner.name(), retries = retry, error = %e, "Retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

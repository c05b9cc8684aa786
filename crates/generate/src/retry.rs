use async_trait::async_trait;
use ingest::{DocError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::llm::TextGeneration;
use crate::schema::GenerationRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    /// Retry a future with exponential backoff
    pub async fn retry<F, Fut, T, E>(&self, operation_name: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(e);
                    }

                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis(),
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;

                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }
}

/// Wraps a backend with a per-call timeout and bounded retries. Every
/// failure is treated alike; there is no special casing of rate limits.
pub struct RetryingGeneration<G> {
    inner: G,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl<G: TextGeneration> RetryingGeneration<G> {
    pub fn new(inner: G, policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            call_timeout,
        }
    }

    pub fn from_config(inner: G, config: &RetryConfig) -> Self {
        Self::new(
            inner,
            RetryPolicy::from_config(config),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl<G: TextGeneration> TextGeneration for RetryingGeneration<G> {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let inner = &self.inner;
        let call_timeout = self.call_timeout;

        self.policy
            .retry("text_generation", || async move {
                match timeout(call_timeout, inner.complete(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(DocError::Generation(format!(
                        "generation call timed out after {}s",
                        call_timeout.as_secs_f32()
                    ))),
                }
            })
            .await
    }
}

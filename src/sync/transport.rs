//! Bounded exponential backoff around scribe service calls.
//!
//! Up to `max_attempts` tries; the delay after failed attempt k
//! (0-indexed) is `min(max_delay, base_delay * multiplier^k)`. A
//! server-supplied `retry_after` hint overrides the computed delay for
//! the next attempt only. Auth failures are never retried regardless
//! of their retryable flag.

use std::future::Future;
use std::time::Duration;

use super::api::{
    RewriteRequest, RewriteResponse, ScribeService, TranscriptionRequest, TranscriptionResponse,
};
use super::error::ApiError;

/// Backoff parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Computed delay after failed attempt `attempt` (0-indexed)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponential =
            self.base_delay.as_secs_f64() * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        self.max_delay.min(Duration::from_secs_f64(exponential))
    }
}

/// A scribe service wrapped with the retry policy
pub struct RetryingTransport<S> {
    service: S,
    policy: RetryPolicy,
}

impl<S: ScribeService> RetryingTransport<S> {
    pub fn new(service: S, policy: RetryPolicy) -> Self {
        Self { service, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResponse, ApiError> {
        self.execute("transcribe", || self.service.transcribe(request))
            .await
    }

    pub async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteResponse, ApiError> {
        self.execute("rewrite", || self.service.rewrite(request))
            .await
    }

    async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let exhausted = attempt + 1 >= self.policy.max_attempts;
                    if !error.should_retry() || exhausted {
                        tracing::warn!(
                            operation,
                            attempt = attempt + 1,
                            kind = %error.kind,
                            "request failed, not retrying"
                        );
                        return Err(error);
                    }

                    // The server hint overrides the computed backoff for
                    // this one delay
                    let delay = match error.retry_after {
                        Some(seconds) => Duration::from_secs(seconds),
                        None => self.policy.delay_after(attempt),
                    };

                    tracing::info!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        kind = %error.kind,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

//! Retry wrapper with exponential backoff for transient provider failures

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::tools::ToolDefinition;

use super::types::{ChatMessage, ChatResponse, LlmProvider};

/// Ceiling for configured attempts
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Longest single backoff between attempts
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Retries a single provider on rate limits, server errors and timeouts
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    max_attempts: u32,
    base_retry_delay: Duration,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>) -> Self {
        Self {
            inner,
            max_attempts: 3,
            base_retry_delay: Duration::from_millis(500),
        }
    }

    /// Set the total number of attempts, clamped to `1..=MAX_ATTEMPTS_LIMIT`
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        if max_attempts > MAX_ATTEMPTS_LIMIT {
            warn!(
                "max_attempts {} exceeds limit, using {}",
                max_attempts, MAX_ATTEMPTS_LIMIT
            );
        }
        self.max_attempts = max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT);
        self
    }

    /// Exponential backoff before the retry following `attempt`, capped
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_retry_delay
            .checked_mul(factor)
            .map_or(MAX_RETRY_DELAY, |d| d.min(MAX_RETRY_DELAY))
    }

    /// Set the base retry delay for exponential backoff
    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse> {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            match self.inner.chat(messages, tools, system).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let err_str = e.to_string();
                    let retryable = is_retryable_error(&err_str);

                    warn!(
                        "Provider {} ({}) failed (attempt {}/{}, retryable={}): {}",
                        self.inner.provider_name(),
                        self.inner.model(),
                        attempt + 1,
                        self.max_attempts,
                        retryable,
                        err_str,
                    );

                    last_error = Some(e);

                    if !retryable {
                        break;
                    }

                    if attempt + 1 < self.max_attempts {
                        let delay = self.backoff(attempt);
                        debug!("Backing off for {:?} before retry", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Provider {} failed", self.inner.provider_name())))
    }
}

/// Determine if an error is retryable (rate limit, server error, timeout)
fn is_retryable_error(err: &str) -> bool {
    let retryable_patterns = [
        "429",
        "500",
        "502",
        "503",
        "504",
        "rate limit",
        "rate_limit",
        "overloaded",
        "timeout",
        "timed out",
        "connection reset",
        "connection refused",
        "temporarily unavailable",
    ];
    let lower = err.to_lowercase();
    retryable_patterns.iter().any(|p| lower.contains(p))
}

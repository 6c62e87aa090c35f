use std::future::Future;
use std::time::Duration;

use dofunc_core::Result;
use dofunc_core::config::RetryConfig;

use crate::context::OpContext;

/// Bounded exponential backoff for idempotent requests.
///
/// Only errors for which [`dofunc_core::ProviderError::is_retryable`] holds
/// are retried. Callers must not route non-idempotent mutations through
/// here: the control-plane API offers no de-duplication key.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub async fn run<T, F, Fut>(&self, ctx: &OpContext, operation: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let backoff = self.backoff_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    ctx.sleep(operation, backoff).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

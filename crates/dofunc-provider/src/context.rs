//! Per-operation execution context: caller deadline plus cancellation.

use std::future::Future;
use std::time::Duration;

use dofunc_core::{ProviderError, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Bounds every blocking point of a controller operation.
///
/// Futures passed to [`OpContext::bound`] are dropped when the deadline
/// passes or the token is cancelled, which aborts in-flight HTTP requests and
/// kills child processes spawned with `kill_on_drop`.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The smaller of `limit` and the time left until the deadline.
    pub fn effective_timeout(&self, limit: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => limit.min(deadline.saturating_duration_since(Instant::now())),
            None => limit,
        }
    }

    /// Run `fut` bounded by `limit`, the deadline and cancellation.
    pub async fn bound<T, F>(&self, operation: &str, limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(ProviderError::Cancelled {
                operation: operation.to_string(),
            });
        }
        let after = self.effective_timeout(limit);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled {
                operation: operation.to_string(),
            }),
            res = tokio::time::timeout(after, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(ProviderError::Timeout {
                    operation: operation.to_string(),
                    after,
                }),
            },
        }
    }

    /// Sleep for `delay` unless cancelled first.
    pub async fn sleep(&self, operation: &str, delay: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled {
                operation: operation.to_string(),
            }),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

//! Retry with exponential backoff for background data refreshes.
//!
//! Only idempotent reads go through here. Mutations are never retried, and
//! this path talks to the remote service directly, so it never counts
//! against a local window store.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::signal::{Rejection, RejectionKind};

/// A remote read that can be repeated safely.
#[async_trait]
pub trait Refresh: Send + Sync {
    /// What a successful refresh yields.
    type Output: Send;

    /// Perform one attempt.
    async fn refresh(&self) -> Result<Self::Output, Rejection>;
}

/// When and how long to back off between refresh attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first failure
    pub max_attempts: u32,
    /// Upper bound for a single backoff delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Whether to retry after `retries` retries have already been made.
    pub fn should_retry(&self, retries: u32, kind: &RejectionKind) -> bool {
        match kind {
            RejectionKind::NotFound => false,
            _ => retries < self.max_attempts,
        }
    }

    /// Backoff before retry number `attempt` (starting at 1): `2^attempt` seconds.
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max_delay)
    }
}

/// Run `source` until it succeeds or the policy gives up.
///
/// Returns the last rejection when giving up.
pub async fn refresh_with_retry<R>(policy: &RetryPolicy, source: &R) -> Result<R::Output, Rejection>
where
    R: Refresh + ?Sized,
{
    let mut retries = 0;

    loop {
        let rejection = match source.refresh().await {
            Ok(output) => return Ok(output),
            Err(rejection) => rejection,
        };

        let kind = RejectionKind::classify(&rejection);
        if !policy.should_retry(retries, &kind) {
            warn!(
                status = rejection.status,
                retries = retries,
                "Giving up on refresh"
            );
            return Err(rejection);
        }

        retries += 1;
        let delay = policy.delay(retries);
        debug!(
            status = rejection.status,
            attempt = retries,
            delay_ms = delay.as_millis() as u64,
            "Refresh failed, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

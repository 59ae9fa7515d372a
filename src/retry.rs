//! Waiting out replication lag.
//!
//! A FreeIPA cluster behind a load balancer can answer the request right
//! after a write from a replica that has not seen the write yet. The poll
//! here re-probes with exponential backoff while the probe reports
//! NotFound, and gives up at a deadline or when the provider is stopped.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Bounds of the replication poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first miss.
    pub initial_delay: Duration,
    /// Cap on a single delay.
    pub max_delay: Duration,
    /// Total time allowed for the poll. Zero disables polling.
    pub timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            timeout: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// A policy that never polls.
    pub fn disabled() -> Self {
        Self {
            timeout: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Default delays with the given overall bound.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Set the delay after the first miss.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the cap on a single delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Whether the poll runs at all.
    pub fn is_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }

    /// Delay before retry number `attempt` (0-based): doubles each time up to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `probe` until it succeeds.
///
/// Only [`ProviderError::NotFound`] is retried; any other error is returned
/// as-is. Returns [`ProviderError::DeadlineExceeded`] once `policy.timeout`
/// has passed and [`ProviderError::Cancelled`] when `cancel` fires. A timeout
/// too large to place on the clock means no deadline.
pub async fn poll_while_not_found<T, F, Fut>(
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut probe: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let deadline = Instant::now().checked_add(policy.timeout);
    let mut attempt = 0u32;

    loop {
        match probe().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(what, attempts = attempt + 1, "Entry became visible");
                }
                return Ok(value);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let mut delay = policy.delay_for(attempt);
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(ProviderError::DeadlineExceeded(format!(
                    "{} still not visible after {:?}",
                    what, policy.timeout
                )));
            }
            delay = delay.min(deadline - now);
        }
        warn!(
            what,
            attempt = attempt + 1,
            wait_ms = delay.as_millis() as u64,
            "Entry not visible yet, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ProviderError::Cancelled(format!(
                    "stopped while waiting for {}",
                    what
                )));
            }
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

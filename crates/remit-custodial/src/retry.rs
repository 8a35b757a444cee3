//! Exponential back-off for custodial API calls.
//!
//! Transfers carry an idempotency key, so replaying a request after a
//! transient failure never moves funds twice.

use std::future::Future;
use std::time::Duration;

use crate::error::CustodialError;

/// Timeouts, connection failures, HTTP 429 and 5xx. Rejections and malformed
/// bodies go straight back to the caller.
pub(crate) fn is_retriable(err: &CustodialError) -> bool {
    match err {
        CustodialError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        CustodialError::Api { status, .. } => *status == 429 || *status >= 500,
        CustodialError::Deserialize { .. } | CustodialError::InvalidBaseUrl(_) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Backoff {
    max_retries: u32,
    base: Duration,
}

impl Backoff {
    const CEILING: Duration = Duration::from_secs(30);

    pub(crate) fn new(max_retries: u32, base_ms: u64) -> Self {
        Self {
            max_retries,
            base: Duration::from_millis(base_ms),
        }
    }

    pub(crate) fn max_retries(self) -> u32 {
        self.max_retries
    }

    /// Delay before retry `n` (1-based) without jitter: `base × 2ⁿ⁻¹`, capped.
    fn nominal(self, n: u32) -> Duration {
        let factor = 1u32 << n.saturating_sub(1).min(16);
        self.base.saturating_mul(factor).min(Self::CEILING)
    }

    /// Nominal delay scaled by a random factor in `[0.75, 1.25)`.
    fn jittered(self, n: u32) -> Duration {
        self.nominal(n).mul_f64(rand::random_range(0.75..1.25))
    }

    /// Runs `operation`, retrying transient failures up to `max_retries` times.
    pub(crate) async fn run<T, F, Fut>(self, mut operation: F) -> Result<T, CustodialError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CustodialError>>,
    {
        let mut retry = 0u32;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if retry >= self.max_retries || !is_retriable(&err) {
                return Err(err);
            }
            retry += 1;
            let delay = self.jittered(retry);
            tracing::warn!(
                retry,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "custodial: transient error, retrying after back-off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

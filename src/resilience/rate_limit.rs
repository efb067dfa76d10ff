//! Per-provider rate limiting and retry with exponential backoff.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::providers::ProviderError;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter plus retry policy for one provider.
#[derive(Clone)]
pub struct RequestGovernor {
    provider: String,
    limiter: Arc<Limiter>,
    max_retries: u32,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
}

impl RequestGovernor {
    pub fn new(provider: impl Into<String>, config: &RateLimitConfig) -> Self {
        Self {
            provider: provider.into(),
            limiter: create_rate_limiter(config),
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
            backoff_max_ms: config.backoff_max_ms,
        }
    }

    /// Wait for a rate-limit slot, then run `operation`, retrying retryable failures.
    pub async fn run<F, Fut, T>(&self, operation: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;

        loop {
            self.limiter.until_ready().await;

            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;

                    if !e.is_retryable() || attempt > self.max_retries {
                        return Err(e);
                    }

                    let backoff = backoff_delay(attempt, self.backoff_base_ms, self.backoff_max_ms);
                    warn!(
                        provider = %self.provider,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Provider request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Delay before retry number `attempt` (1-based), doubling from `base_ms` up to `max_ms`.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let ms = base_ms.saturating_mul(2u64.pow(exponent)).min(max_ms);
    Duration::from_millis(ms)
}

fn create_rate_limiter(config: &RateLimitConfig) -> Arc<Limiter> {
    let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(config.burst_size).unwrap_or(rps);

    let quota = Quota::per_second(rps).allow_burst(burst);
    Arc::new(RateLimiter::direct(quota))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(max_retries: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: 100,
            burst_size: 100,
            max_retries,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1, 250, 4000), Duration::from_millis(250));
        assert_eq!(backoff_delay(2, 250, 4000), Duration::from_millis(500));
        assert_eq!(backoff_delay(3, 250, 4000), Duration::from_millis(1000));
        assert_eq!(backoff_delay(10, 250, 4000), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_retries_retryable_errors() {
        let governor = RequestGovernor::new("test", &config(2));
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result = governor
            .run(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ProviderError::Network("connection reset".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_parse_errors() {
        let governor = RequestGovernor::new("test", &config(3));
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = governor
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Parse("unexpected token".into()))
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let governor = RequestGovernor::new("test", &config(1));
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = governor
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Status(503))
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Status(503))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

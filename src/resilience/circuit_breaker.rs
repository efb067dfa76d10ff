//! Provider circuit breaker.
//!
//! Stops calling an external provider after repeated failures. Once the
//! recovery timeout has passed the breaker goes half-open and admits every
//! caller; `half_open_success_threshold` successes close it again and any
//! failure reopens it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls allowed
    Closed,
    /// Failure threshold exceeded - calls blocked
    Open,
    /// Recovery period - trial calls allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit
    pub failure_threshold: u32,
    /// Time to wait before moving from Open to HalfOpen
    pub recovery_timeout: Duration,
    /// Successful calls needed in HalfOpen to close the circuit
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_success_threshold: 1,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(settings.recovery_timeout_seconds),
            half_open_success_threshold: settings.half_open_success_threshold.max(1),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    last_failure: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
}

/// Point-in-time view of a breaker, for monitoring routes.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_trips: u64,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub seconds_until_retry: Option<u64>,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
    total_trips: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
                last_failure: None,
                last_success: None,
            }),
            total_trips: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Whether a call may go through right now.
    ///
    /// An Open breaker whose recovery timeout has elapsed moves to HalfOpen
    /// and admits the call.
    pub async fn allow(&self) -> bool {
        {
            let inner = self.inner.read().await;
            match inner.state {
                CircuitState::Closed | CircuitState::HalfOpen => return true,
                CircuitState::Open => {
                    let ready = inner
                        .opened_at
                        .map(|at| at.elapsed() >= self.config.recovery_timeout)
                        .unwrap_or(true);
                    if !ready {
                        return false;
                    }
                }
            }
        }

        let mut inner = self.inner.write().await;
        if inner.state == CircuitState::Open {
            inner.state = CircuitState::HalfOpen;
            inner.half_open_successes = 0;
            info!(provider = %self.name, "Circuit breaker transitioning to HALF-OPEN");
        }
        true
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures = 0;
        inner.last_success = Some(Utc::now());

        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.half_open_success_threshold {
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.half_open_successes = 0;
                info!(provider = %self.name, "Circuit breaker CLOSED - provider recovered");
            }
        }
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Utc::now());

        let should_trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };

        if should_trip {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.half_open_successes = 0;
            self.total_trips.fetch_add(1, Ordering::Relaxed);
            warn!(
                provider = %self.name,
                failures = inner.consecutive_failures,
                "Circuit breaker TRIPPED"
            );
        } else {
            debug!(
                provider = %self.name,
                failures = inner.consecutive_failures,
                "Provider failure recorded"
            );
        }
    }

    /// Force the breaker closed, e.g. after an operator fixed credentials.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
        warn!(provider = %self.name, "Circuit breaker force-closed");
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.read().await;
        let seconds_until_retry = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => Some(
                self.config
                    .recovery_timeout
                    .saturating_sub(at.elapsed())
                    .as_secs(),
            ),
            _ => None,
        };

        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_trips: self.total_trips.load(Ordering::Relaxed),
            last_failure: inner.last_failure,
            last_success: inner.last_success,
            seconds_until_retry,
        }
    }
}

/// Breakers keyed by provider name, created on first use.
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }

    pub async fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| entry.value().clone()).collect();

        let mut snapshots = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: Duration::from_millis(20),
            half_open_success_threshold: 1,
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_closed() {
        let cb = CircuitBreaker::new("espn", CircuitBreakerConfig::default());
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.allow().await);
    }

    #[tokio::test]
    async fn test_trips_at_threshold() {
        let cb = CircuitBreaker::new("espn", fast_config(3));
        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.allow().await);
        assert_eq!(cb.snapshot().await.total_trips, 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("espn", fast_config(2));
        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_recovers_through_half_open() {
        let cb = CircuitBreaker::new("odds_api", fast_config(1));
        cb.record_failure().await;
        assert!(!cb.allow().await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cb.allow().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_admits_every_caller_until_threshold() {
        let cb = CircuitBreaker::new(
            "espn",
            CircuitBreakerConfig {
                half_open_success_threshold: 2,
                ..fast_config(1)
            },
        );
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        for _ in 0..3 {
            assert!(cb.allow().await);
        }
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset_force_closes() {
        let cb = CircuitBreaker::new("espn", fast_config(1));
        cb.record_failure().await;
        cb.reset().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.allow().await);
        assert_eq!(cb.snapshot().await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("odds_api", fast_config(3));
        for _ in 0..3 {
            cb.record_failure().await;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cb.allow().await);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert_eq!(cb.snapshot().await.total_trips, 2);
    }

    #[tokio::test]
    async fn test_registry_reuses_breakers() {
        let registry = BreakerRegistry::new(fast_config(1));
        registry.get("espn").record_failure().await;
        assert_eq!(registry.get("espn").state().await, CircuitState::Open);
        assert_eq!(registry.get("odds_api").state().await, CircuitState::Closed);

        let snapshots = registry.snapshots().await;
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "espn");
        assert!(snapshots[0].seconds_until_retry.is_some());
    }
}

//! Shared infrastructure for talking to unreliable upstreams: one cache,
//! one circuit breaker type, one rate-limit/retry policy.

pub mod cache;
pub mod circuit_breaker;
pub mod rate_limit;

pub use cache::{CacheStats, TtlCache};
pub use circuit_breaker::{
    BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use rate_limit::RequestGovernor;

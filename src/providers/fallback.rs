//! Ordered provider chain with cache and static fallback.
//!
//! Live providers are tried in order, skipping any whose breaker is open.
//! When all of them fail the chain serves the last good response from the
//! shared cache (stale copies only up to `stale_ttl`) and finally the
//! built-in static rows.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{CanonicalRows, DataType, Sport};
use crate::providers::static_data::StaticProvider;
use crate::providers::{ProviderError, SportsProvider};
use crate::resilience::{BreakerRegistry, TtlCache};

/// Cache namespace for successful provider responses.
pub const LIVE_NAMESPACE: &str = "live";

pub fn cache_key(sport: Sport, data_type: DataType) -> String {
    format!("{sport}:{data_type}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchOrigin {
    Live { provider: String },
    Cache { age_seconds: u64 },
    Static,
}

impl FetchOrigin {
    pub fn label(&self) -> String {
        match self {
            Self::Live { provider } => provider.clone(),
            Self::Cache { .. } => "cache".to_string(),
            Self::Static => "static".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchAttempt {
    pub provider: String,
    /// "ok", "circuit_open", or the error category.
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub rows: CanonicalRows,
    pub origin: FetchOrigin,
    pub degraded: bool,
    pub attempts: Vec<FetchAttempt>,
}

pub struct FallbackChain {
    providers: Vec<Arc<dyn SportsProvider>>,
    breakers: Arc<BreakerRegistry>,
    cache: Arc<TtlCache<CanonicalRows>>,
    static_provider: StaticProvider,
    live_ttl: Duration,
    stale_ttl: Duration,
}

impl FallbackChain {
    pub fn new(
        providers: Vec<Arc<dyn SportsProvider>>,
        breakers: Arc<BreakerRegistry>,
        cache: Arc<TtlCache<CanonicalRows>>,
        live_ttl: Duration,
        stale_ttl: Duration,
    ) -> Self {
        Self {
            providers,
            breakers,
            cache,
            static_provider: StaticProvider::new(),
            live_ttl,
            stale_ttl,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub async fn fetch(&self, sport: Sport, data_type: DataType) -> FetchOutcome {
        let key = cache_key(sport, data_type);
        let mut attempts = Vec::new();

        for provider in &self.providers {
            if !provider.supports(sport, data_type) {
                continue;
            }

            let name = provider.name().to_string();
            let breaker = self.breakers.get(&name);
            if !breaker.allow().await {
                let skipped = ProviderError::CircuitOpen(name.clone());
                debug!(%sport, %data_type, error = %skipped, "Skipping provider");
                attempts.push(FetchAttempt {
                    provider: name,
                    outcome: skipped.category().to_string(),
                });
                continue;
            }

            match provider.fetch(sport, data_type).await {
                Ok(rows) => {
                    breaker.record_success().await;
                    // Kept until stale_ttl so purges never drop a usable fallback copy.
                    let keep_for = self.stale_ttl.max(self.live_ttl);
                    self.cache
                        .set_with_ttl(LIVE_NAMESPACE, &key, rows.clone(), keep_for);
                    info!(provider = %name, %sport, %data_type, rows = rows.len(), "Live fetch succeeded");
                    attempts.push(FetchAttempt {
                        provider: name.clone(),
                        outcome: "ok".to_string(),
                    });
                    return FetchOutcome {
                        rows,
                        origin: FetchOrigin::Live { provider: name },
                        degraded: false,
                        attempts,
                    };
                }
                Err(e) => {
                    if e.counts_against_breaker() {
                        breaker.record_failure().await;
                    }
                    warn!(
                        provider = %name,
                        %sport,
                        %data_type,
                        category = e.category(),
                        error = %e,
                        "Provider fetch failed"
                    );
                    attempts.push(FetchAttempt {
                        provider: name,
                        outcome: e.category().to_string(),
                    });
                }
            }
        }

        if let Some((rows, age)) = self.cache.get_stale(LIVE_NAMESPACE, &key) {
            let fresh = age < self.live_ttl;
            if fresh || age <= self.stale_ttl {
                warn!(%sport, %data_type, age_seconds = age.as_secs(), fresh, "Serving cached provider data");
                return FetchOutcome {
                    rows,
                    origin: FetchOrigin::Cache {
                        age_seconds: age.as_secs(),
                    },
                    degraded: !fresh,
                    attempts,
                };
            }
        }

        warn!(%sport, %data_type, "All providers failed and no usable cache, serving static data");
        FetchOutcome {
            rows: self.static_provider.rows(sport, data_type),
            origin: FetchOrigin::Static,
            degraded: true,
            attempts,
        }
    }
}

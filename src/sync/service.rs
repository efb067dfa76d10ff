use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clean::clean_rows;
use crate::db::{NewScrapeLog, Store};
use crate::models::{CanonicalRows, DataType, Sport};
use crate::monitoring::health::{HealthState, LastSync};
use crate::providers::fallback::FetchAttempt;
use crate::providers::{FallbackChain, FetchOrigin};

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub sport: Sport,
    pub data_type: DataType,
    pub rows_fetched: usize,
    pub rows_cleaned: usize,
    pub rows_written: u64,
    pub origin: FetchOrigin,
    pub degraded: bool,
    pub attempts: Vec<FetchAttempt>,
}

/// Result of a multi-sport pass. Failures are collected, never fatal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncBatch {
    pub reports: Vec<SyncReport>,
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Summary of the live attempts when every provider that was tried
    /// failed. `None` when a provider answered or none was tried.
    pub fn upstream_failure(&self) -> Option<String> {
        if matches!(self.origin, FetchOrigin::Live { .. }) || self.attempts.is_empty() {
            return None;
        }
        let summary: Vec<String> = self
            .attempts
            .iter()
            .map(|a| format!("{}={}", a.provider, a.outcome))
            .collect();
        Some(summary.join(", "))
    }
}

impl SyncBatch {
    pub fn rows_written(&self) -> u64 {
        self.reports.iter().map(|r| r.rows_written).sum()
    }
}

/// Only live provider data is persisted. Cached rows were written when
/// first fetched, and static rows are placeholders.
pub fn should_persist(origin: &FetchOrigin) -> bool {
    matches!(origin, FetchOrigin::Live { .. })
}

/// Row count as stored in `scrape_logs`, saturating at `i32::MAX`.
pub fn log_count<T: TryInto<i32>>(count: T) -> i32 {
    count.try_into().unwrap_or(i32::MAX)
}

/// Fetches through the fallback chain and upserts into the store.
#[derive(Clone)]
pub struct SyncService {
    store: Store,
    chain: Arc<FallbackChain>,
    health: HealthState,
}

impl SyncService {
    pub fn new(store: Store, chain: Arc<FallbackChain>, health: HealthState) -> Self {
        Self {
            store,
            chain,
            health,
        }
    }

    #[instrument(skip(self), fields(%sport, %data_type))]
    pub async fn sync(&self, sport: Sport, data_type: DataType) -> Result<SyncReport> {
        let run_id = Uuid::new_v4();
        let outcome = self.chain.fetch(sport, data_type).await;
        let rows_fetched = outcome.rows.len();
        let cleaned = clean_rows(outcome.rows);
        let rows_cleaned = cleaned.len();

        let write = if should_persist(&outcome.origin) {
            self.write(&cleaned).await
        } else {
            warn!(
                origin = %outcome.origin.label(),
                degraded = outcome.degraded,
                "Skipping database write for non-live data"
            );
            Ok(0)
        };

        let (rows_written, error_message) = match &write {
            Ok(n) => (*n, None),
            Err(e) => (0, Some(format!("{e:#}"))),
        };

        let log = NewScrapeLog {
            run_id,
            source: outcome.origin.label(),
            sport,
            data_type: data_type.as_str().to_string(),
            records_scraped: log_count(rows_fetched),
            records_written: log_count(rows_written),
            degraded: outcome.degraded,
            success: write.is_ok(),
            error_message: error_message.clone(),
        };
        if let Err(e) = self.store.log_scrape(&log).await {
            warn!(error = %e, "Failed to record scrape log");
        }

        self.health
            .record_sync(LastSync {
                sport,
                data_type,
                source: outcome.origin.label(),
                rows_written,
                degraded: outcome.degraded,
                success: write.is_ok(),
                at: Utc::now(),
            })
            .await;

        if let Err(e) = write {
            error!(%run_id, error = %e, "Sync write failed");
            return Err(e.context(format!("Failed to store {sport} {data_type}")));
        }

        info!(
            %run_id,
            origin = %outcome.origin.label(),
            rows_fetched,
            rows_cleaned,
            rows_written,
            degraded = outcome.degraded,
            "Sync complete"
        );

        Ok(SyncReport {
            run_id,
            sport,
            data_type,
            rows_fetched,
            rows_cleaned,
            rows_written,
            origin: outcome.origin,
            degraded: outcome.degraded,
            attempts: outcome.attempts,
        })
    }

    async fn write(&self, rows: &CanonicalRows) -> Result<u64> {
        match rows {
            CanonicalRows::Teams(teams) => self
                .store
                .upsert_teams(teams)
                .await
                .context("Failed to upsert teams"),
            CanonicalRows::Games(games) => self
                .store
                .upsert_games(games)
                .await
                .context("Failed to upsert games"),
            CanonicalRows::Odds(odds) => self
                .store
                .insert_odds(odds)
                .await
                .context("Failed to insert odds"),
        }
    }

    /// Teams before games before odds, since later types reference earlier ones.
    pub async fn sync_all(&self, sports: &[Sport]) -> SyncBatch {
        let mut batch = SyncBatch::default();
        for &sport in sports {
            for data_type in DataType::ALL {
                match self.sync(sport, data_type).await {
                    Ok(report) => batch.reports.push(report),
                    Err(e) => {
                        error!(%sport, %data_type, error = %e, "Sync failed");
                        batch.errors.push(format!("{sport}/{data_type}: {e:#}"));
                    }
                }
            }
        }
        info!(
            syncs = batch.reports.len(),
            failed = batch.errors.len(),
            rows_written = batch.rows_written(),
            "Sync pass finished"
        );
        batch
    }

    /// One data type across several sports, as the scheduler runs it.
    pub async fn sync_type(&self, sports: &[Sport], data_type: DataType) -> SyncBatch {
        let mut batch = SyncBatch::default();
        for &sport in sports {
            match self.sync(sport, data_type).await {
                Ok(report) => batch.reports.push(report),
                Err(e) => {
                    error!(%sport, %data_type, error = %e, "Sync failed");
                    batch.errors.push(format!("{sport}/{data_type}: {e:#}"));
                }
            }
        }
        batch
    }
}

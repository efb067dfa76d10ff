use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::db::{GradeReport, IntegrityReport, Store};
use crate::models::CanonicalRows;
use crate::resilience::TtlCache;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    pub duplicate_games_removed: u64,
    pub old_odds_removed: u64,
    pub integrity: Option<IntegrityReport>,
    pub graded: Option<GradeReport>,
    pub cache_entries_purged: usize,
    pub errors: Vec<String>,
}

/// Daily housekeeping. Each step runs even if an earlier one failed.
pub struct Maintenance {
    store: Store,
    live_cache: Arc<TtlCache<CanonicalRows>>,
    route_cache: Arc<TtlCache<serde_json::Value>>,
    odds_retention_days: i64,
}

impl Maintenance {
    pub fn new(
        store: Store,
        live_cache: Arc<TtlCache<CanonicalRows>>,
        route_cache: Arc<TtlCache<serde_json::Value>>,
        odds_retention_days: i64,
    ) -> Self {
        Self {
            store,
            live_cache,
            route_cache,
            odds_retention_days,
        }
    }

    pub async fn run(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match self.store.remove_duplicate_games().await {
            Ok(n) => report.duplicate_games_removed = n,
            Err(e) => report.errors.push(format!("dedup: {e:#}")),
        }

        match self.store.clean_old_odds(self.odds_retention_days).await {
            Ok(n) => report.old_odds_removed = n,
            Err(e) => report.errors.push(format!("odds cleanup: {e:#}")),
        }

        match self.store.integrity_report().await {
            Ok(integrity) => {
                if !integrity.is_clean() {
                    warn!(
                        orphan_games = integrity.orphan_games,
                        orphan_odds = integrity.orphan_odds,
                        "Integrity check found orphaned rows"
                    );
                }
                report.integrity = Some(integrity);
            }
            Err(e) => report.errors.push(format!("integrity: {e:#}")),
        }

        match self.store.grade_predictions().await {
            Ok(graded) => report.graded = Some(graded),
            Err(e) => report.errors.push(format!("grading: {e:#}")),
        }

        report.cache_entries_purged =
            self.live_cache.purge_expired() + self.route_cache.purge_expired();

        for e in &report.errors {
            error!(error = %e, "Maintenance step failed");
        }
        info!(
            duplicates = report.duplicate_games_removed,
            old_odds = report.old_odds_removed,
            purged = report.cache_entries_purged,
            failed_steps = report.errors.len(),
            "Maintenance finished"
        );
        report
    }
}

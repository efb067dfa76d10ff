//! Periodic sync, prediction and maintenance jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{error, info};

use crate::config::SyncConfig;
use crate::models::DataType;
use crate::predict::PredictionService;
use crate::sync::maintenance::Maintenance;
use crate::sync::service::SyncService;

pub struct Scheduler {
    sync: SyncService,
    predictions: Arc<PredictionService>,
    maintenance: Arc<Maintenance>,
    config: SyncConfig,
}

fn job_interval(seconds: u64, fire_now: bool) -> Interval {
    let period = Duration::from_secs(seconds.max(1));
    let mut ticker = if fire_now {
        interval(period)
    } else {
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

impl Scheduler {
    pub fn new(
        sync: SyncService,
        predictions: Arc<PredictionService>,
        maintenance: Arc<Maintenance>,
        config: SyncConfig,
    ) -> Self {
        Self {
            sync,
            predictions,
            maintenance,
            config,
        }
    }

    /// Run until the returned handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let now = self.config.run_on_startup;
        let mut teams = job_interval(self.config.teams_interval_seconds, now);
        let mut games = job_interval(self.config.games_interval_seconds, now);
        let mut odds = job_interval(self.config.odds_interval_seconds, now);
        let mut maintenance = job_interval(self.config.maintenance_interval_seconds, now);

        info!(
            sports = ?self.config.sports,
            teams_s = self.config.teams_interval_seconds,
            games_s = self.config.games_interval_seconds,
            odds_s = self.config.odds_interval_seconds,
            maintenance_s = self.config.maintenance_interval_seconds,
            run_on_startup = now,
            "Scheduler started"
        );

        let sports = self.config.sports.clone();
        loop {
            // Biased so a startup pass runs teams, then games, then odds.
            tokio::select! {
                biased;
                _ = teams.tick() => {
                    self.sync.sync_type(&sports, DataType::Teams).await;
                }
                _ = games.tick() => {
                    self.sync.sync_type(&sports, DataType::Games).await;
                    if let Err(e) = self.predictions.generate(self.config.prediction_days_ahead).await {
                        error!(error = %e, "Prediction run failed");
                    }
                }
                _ = odds.tick() => {
                    self.sync.sync_type(&sports, DataType::Odds).await;
                }
                _ = maintenance.tick() => {
                    self.maintenance.run().await;
                }
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use apex_stats::config::{AppConfig, Secrets};
use apex_stats::db::Store;
use apex_stats::models::{CanonicalRows, DataType, Sport};
use apex_stats::monitoring::health::HealthState;
use apex_stats::monitoring::logger;
use apex_stats::predict::{PredictionService, TrainedModel};
use apex_stats::providers::{EspnProvider, FallbackChain, OddsApiProvider, SportsProvider};
use apex_stats::resilience::{BreakerRegistry, CircuitBreakerConfig, RequestGovernor, TtlCache};
use apex_stats::server::{self, AppState};
use apex_stats::sync::{Maintenance, Scheduler, SyncService};

#[derive(Parser)]
#[command(name = "apex-stats", version, about = "Sports statistics sync and API server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the sync scheduler.
    Serve,
    /// Run one sync. Without flags, every configured sport and data type.
    Sync {
        #[arg(long)]
        sport: Option<Sport>,
        #[arg(long)]
        data_type: Option<DataType>,
    },
    /// Run maintenance once: dedup, odds cleanup, integrity check, grading.
    Maintain,
    /// Generate predictions for upcoming games.
    Predict {
        #[arg(long)]
        days: Option<i64>,
    },
    /// Grade stored predictions against final scores.
    Grade,
    /// Fit per-sport models on completed games and save them.
    Train {
        #[arg(long)]
        sport: Option<Sport>,
        /// Days of completed games to learn from.
        #[arg(long)]
        days: Option<i64>,
    },
}

/// Everything the subcommands share.
struct Components {
    store: Store,
    chain: Arc<FallbackChain>,
    live_cache: Arc<TtlCache<CanonicalRows>>,
    route_cache: Arc<TtlCache<serde_json::Value>>,
    health: HealthState,
}

impl Components {
    async fn build(config: &AppConfig, secrets: &Secrets) -> Result<Self> {
        let store = Store::connect(secrets.require_database_url()?, &config.database).await?;

        let timeout = Duration::from_secs(config.providers.request_timeout_seconds);
        let espn = EspnProvider::new(
            &config.providers.espn_base_url,
            timeout,
            RequestGovernor::new(apex_stats::providers::espn::PROVIDER_NAME, &config.rate_limit),
            config.sync.schedule_days_back,
            config.sync.schedule_days_ahead,
        )
        .context("Failed to build ESPN provider")?;
        let odds_api = OddsApiProvider::new(
            &config.providers.odds_api_base_url,
            secrets.odds_api_key.clone(),
            &config.providers.odds_regions,
            timeout,
            RequestGovernor::new(apex_stats::providers::odds_api::PROVIDER_NAME, &config.rate_limit),
        )
        .context("Failed to build Odds API provider")?;
        if !odds_api.is_configured() {
            tracing::warn!("ODDS_API_KEY not set, odds will come from cache or static data only");
        }

        let providers: Vec<Arc<dyn SportsProvider>> = vec![Arc::new(espn), Arc::new(odds_api)];
        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::from(
            &config.circuit_breaker,
        )));
        let default_ttl = Duration::from_secs(config.cache.default_ttl_seconds);
        let live_cache = Arc::new(TtlCache::new(default_ttl));
        let route_cache = Arc::new(TtlCache::new(default_ttl));

        let chain = Arc::new(FallbackChain::new(
            providers,
            breakers,
            live_cache.clone(),
            Duration::from_secs(config.cache.live_ttl_seconds),
            Duration::from_secs(config.cache.stale_ttl_seconds),
        ));

        Ok(Self {
            store,
            chain,
            live_cache,
            route_cache,
            health: HealthState::new(),
        })
    }

    fn sync_service(&self) -> SyncService {
        SyncService::new(self.store.clone(), self.chain.clone(), self.health.clone())
    }

    /// Uses the saved trained model when one exists.
    fn predictions(&self, config: &AppConfig) -> Result<PredictionService> {
        let trained = TrainedModel::load(&config.models.path)?;
        match &trained {
            Some(model) => tracing::info!(
                path = %config.models.path.display(),
                sports = model.sports.len(),
                "Loaded trained model"
            ),
            None => tracing::info!(
                path = %config.models.path.display(),
                "No trained model, predictions use the baseline"
            ),
        }
        Ok(PredictionService::new(self.store.clone()).with_trained_model(trained))
    }

    fn maintenance(&self, config: &AppConfig) -> Maintenance {
        Maintenance::new(
            self.store.clone(),
            self.live_cache.clone(),
            self.route_cache.clone(),
            config.sync.odds_retention_days,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, secrets) = AppConfig::load()?;

    logger::init_logging(&config.monitoring)?;

    tracing::info!(
        sports = ?config.sync.sports,
        version = env!("CARGO_PKG_VERSION"),
        "apex-stats starting"
    );

    let components = Components::build(&config, &secrets).await?;

    match cli.command {
        Command::Serve => run_server(&config, components).await,
        Command::Sync { sport, data_type } => {
            let sync = components.sync_service();
            let sports = sport.map_or_else(|| config.sync.sports.clone(), |s| vec![s]);
            let batch = match data_type {
                Some(data_type) => sync.sync_type(&sports, data_type).await,
                None => sync.sync_all(&sports).await,
            };
            println!("{}", serde_json::to_string_pretty(&batch)?);
            if !batch.errors.is_empty() {
                anyhow::bail!("{} sync(s) failed", batch.errors.len());
            }
            Ok(())
        }
        Command::Maintain => {
            let report = components.maintenance(&config).run().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Predict { days } => {
            let days = days.unwrap_or(config.sync.prediction_days_ahead);
            let report = components.predictions(&config)?.generate(days).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Grade => {
            let report = PredictionService::new(components.store.clone()).grade().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Train { sport, days } => {
            let sports = sport.map_or_else(|| config.sync.sports.clone(), |s| vec![s]);
            let days = days.unwrap_or(config.models.training_days_back);
            let (mut trained, report) = PredictionService::new(components.store.clone())
                .train(&sports, days, config.models.min_training_games)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            // Sports not retrained this run keep their saved parameters.
            if let Some(previous) = TrainedModel::load(&config.models.path)? {
                for model in previous.sports {
                    if trained.sport(model.sport).is_none() {
                        trained.insert(model);
                    }
                }
            }
            if trained.is_empty() {
                anyhow::bail!("no sport had enough completed games to train");
            }
            trained.save(&config.models.path)
        }
    }
}

/// Serve the API with the scheduler running alongside it.
async fn run_server(config: &AppConfig, components: Components) -> Result<()> {
    let sync = components.sync_service();
    let scheduler = Scheduler::new(
        sync.clone(),
        Arc::new(components.predictions(config)?),
        Arc::new(components.maintenance(config)),
        config.sync.clone(),
    );
    let scheduler_handle = scheduler.spawn();

    let state = AppState {
        store: components.store,
        chain: components.chain,
        live_cache: components.live_cache,
        route_cache: components.route_cache,
        sync,
        health: components.health,
        live_ttl: Duration::from_secs(config.cache.live_ttl_seconds),
    };

    let result = server::serve(state, &config.server).await;

    scheduler_handle.abort();
    tracing::info!("Scheduler stopped");

    result
}

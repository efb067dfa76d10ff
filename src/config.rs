use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;

use crate::models::Sport;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub rate_limit: RateLimitConfig,
    pub providers: ProvidersConfig,
    pub models: ModelsConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub sports: Vec<Sport>,
    /// Days of past scoreboards re-fetched to pick up final scores.
    pub schedule_days_back: u32,
    pub schedule_days_ahead: u32,
    pub teams_interval_seconds: u64,
    pub games_interval_seconds: u64,
    pub odds_interval_seconds: u64,
    pub maintenance_interval_seconds: u64,
    pub odds_retention_days: i64,
    pub prediction_days_ahead: i64,
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub default_ttl_seconds: u64,
    pub live_ttl_seconds: u64,
    /// How old a cached provider response may be and still serve as degraded data.
    pub stale_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_seconds: u64,
    pub half_open_success_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub espn_base_url: String,
    pub odds_api_base_url: String,
    pub request_timeout_seconds: u64,
    /// Odds API bookmaker regions, e.g. "us".
    pub odds_regions: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Trained model file. Predictions use the baseline while it is absent.
    pub path: PathBuf,
    pub training_days_back: i64,
    /// Sports with fewer usable games than this stay on the baseline.
    pub min_training_games: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    #[serde(default = "default_true")]
    pub json_logs: bool,
}

fn default_true() -> bool {
    true
}

/// Secrets loaded exclusively from environment variables.
/// Not serializable, not stored in config files.
pub struct Secrets {
    pub database_url: Option<String>,
    pub odds_api_key: Option<SecretString>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("SUPABASE_DB_URL"))
            .ok();

        Self {
            database_url,
            odds_api_key: std::env::var("ODDS_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
        }
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL (or SUPABASE_DB_URL) must be set")
    }
}

impl AppConfig {
    /// Load configuration from `APEX_CONFIG` or config/default.toml, with secrets from the environment.
    pub fn load() -> Result<(Self, Secrets)> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("APEX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let config = Self::from_file(&config_path)?;
        let secrets = Secrets::from_env();

        Ok((config, secrets))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let config = AppConfig::from_file(Path::new(DEFAULT_CONFIG_PATH))
            .expect("config/default.toml should parse");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sync.odds_interval_seconds, 900);
        assert_eq!(config.sync.games_interval_seconds, 3600);
        assert_eq!(config.sync.schedule_days_ahead, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert!(config.sync.sports.contains(&Sport::Basketball));
        assert_eq!(config.models.path, PathBuf::from("models/trained.json"));
        assert_eq!(config.models.training_days_back, 730);
        assert_eq!(config.models.min_training_games, 30);
    }

    #[test]
    fn test_acquire_timeout() {
        let db = DatabaseConfig {
            max_connections: 5,
            acquire_timeout_seconds: 3,
            run_migrations: false,
        };
        assert_eq!(db.acquire_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let err = AppConfig::from_file(Path::new("config/does-not-exist.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

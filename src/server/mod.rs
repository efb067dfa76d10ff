pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::db::Store;
use crate::models::CanonicalRows;
use crate::monitoring::health::HealthState;
use crate::providers::FallbackChain;
use crate::resilience::TtlCache;
use crate::sync::SyncService;

/// Cache namespace for rendered route responses.
pub const ROUTES_NAMESPACE: &str = "routes";

/// Shared handler state. Every field is a handle, so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub chain: Arc<FallbackChain>,
    pub live_cache: Arc<TtlCache<CanonicalRows>>,
    pub route_cache: Arc<TtlCache<serde_json::Value>>,
    pub sync: SyncService,
    pub health: HealthState,
    /// How long `/api/live` responses stay in the route cache.
    pub live_ttl: Duration,
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/teams", get(routes::teams))
        .route("/api/games", get(routes::games))
        .route("/api/games/{id}", get(routes::game_detail))
        .route("/api/odds", get(routes::odds))
        .route("/api/standings", get(routes::standings))
        .route("/api/predictions", get(routes::predictions))
        .route("/api/live", get(routes::live))
        .route("/api/providers", get(routes::providers))
        .route("/api/providers/{name}/reset", post(routes::reset_provider))
        .route("/api/sync", post(routes::trigger_sync))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
}

/// Serve until ctrl-c.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, create_router(state, &config.allowed_origins))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server error")
}

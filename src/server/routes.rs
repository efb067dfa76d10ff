//! JSON route handlers.
//!
//! Successful responses are `{ "data": ..., "meta": { ... } }`. Required query
//! parameters are validated before any database or provider call.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::clean::clean_rows;
use crate::db::GameFilter;
use crate::error::{ApiError, ApiResult};
use crate::models::{CanonicalRows, DataType, GameStatus, Sport};
use crate::providers::FetchOrigin;
use crate::server::{AppState, ROUTES_NAMESPACE};
use crate::stats::compute_standings;

type Params = HashMap<String, String>;

const DEFAULT_ODDS_LIMIT: i64 = 50;

fn envelope<T: Serialize>(data: T, meta: Value) -> ApiResult<Json<Value>> {
    let data = serde_json::to_value(data)
        .map_err(|e| ApiError::Internal(format!("failed to serialize response: {e}")))?;
    Ok(Json(json!({ "data": data, "meta": meta })))
}

fn required<'a>(params: &'a Params, name: &str) -> ApiResult<&'a str> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::missing_param(name))
}

fn optional<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_value<T>(name: &str, raw: &str) -> ApiResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid '{name}': {e}")))
}

fn parse_optional<T>(params: &Params, name: &str) -> ApiResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    optional(params, name)
        .map(|raw| parse_value(name, raw))
        .transpose()
}

fn required_sport(params: &Params) -> ApiResult<Sport> {
    parse_value("sport", required(params, "sport")?)
}

fn rows_value(rows: &CanonicalRows) -> ApiResult<Value> {
    let value = match rows {
        CanonicalRows::Teams(r) => serde_json::to_value(r),
        CanonicalRows::Games(r) => serde_json::to_value(r),
        CanonicalRows::Odds(r) => serde_json::to_value(r),
    };
    value.map_err(|e| ApiError::Internal(format!("failed to serialize rows: {e}")))
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let snapshot = state.health.snapshot().await;
    let database = match state.store.ping().await {
        Ok(()) => "ok",
        Err(_) => "unreachable",
    };
    envelope(snapshot, json!({ "database": database }))
}

/// GET /api/teams?sport=&league=
#[instrument(skip(state))]
pub async fn teams(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<Json<Value>> {
    let sport = required_sport(&params)?;
    let league = optional(&params, "league");

    let teams = state.store.list_teams(Some(sport), league).await?;
    let count = teams.len();
    envelope(teams, json!({ "sport": sport, "league": league, "count": count }))
}

/// GET /api/games?sport=&league=&team=&from=&to=&status=&limit=
#[instrument(skip(state))]
pub async fn games(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<Json<Value>> {
    let filter = GameFilter {
        sport: Some(required_sport(&params)?),
        league: optional(&params, "league").map(str::to_string),
        team: optional(&params, "team").map(str::to_string),
        from: parse_optional(&params, "from")?,
        to: parse_optional(&params, "to")?,
        status: parse_optional::<GameStatus>(&params, "status")?,
        season: optional(&params, "season").map(str::to_string),
        limit: parse_optional(&params, "limit")?,
    };
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(ApiError::BadRequest("'from' must not be after 'to'".into()));
        }
    }

    let games = state.store.list_games(&filter).await?;
    let count = games.len();
    envelope(
        games,
        json!({
            "sport": filter.sport,
            "league": filter.league,
            "team": filter.team,
            "from": filter.from,
            "to": filter.to,
            "count": count,
        }),
    )
}

/// GET /api/games/{id}
#[instrument(skip(state))]
pub async fn game_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id: i64 = parse_value("id", &id)?;

    let game = state
        .store
        .get_game(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("game {id}")))?;
    let (odds, predictions) = tokio::try_join!(
        state.store.odds_for_game(id),
        state.store.predictions_for_game(id)
    )?;

    let final_score = game.final_score();
    envelope(
        json!({ "game": game, "odds": odds, "predictions": predictions }),
        json!({ "final_score": final_score }),
    )
}

/// GET /api/odds?sport=&league=&limit=
#[instrument(skip(state))]
pub async fn odds(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<Json<Value>> {
    let sport = required_sport(&params)?;
    let limit = parse_optional(&params, "limit")?.unwrap_or(DEFAULT_ODDS_LIMIT);
    let league = optional(&params, "league").unwrap_or(sport.default_league());

    let odds = state.store.latest_odds(league, limit).await?;
    let count = odds.len();
    envelope(odds, json!({ "sport": sport, "league": league, "count": count }))
}

/// GET /api/standings?sport=&league=&season=
///
/// Without `season`, the season of the most recent completed game is used.
#[instrument(skip(state))]
pub async fn standings(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<Json<Value>> {
    let sport = required_sport(&params)?;
    let league = optional(&params, "league").unwrap_or(sport.default_league());

    let completed = state.store.completed_games(league, None).await?;
    let season = optional(&params, "season")
        .map(str::to_string)
        .or_else(|| completed.last().map(|g| g.season.clone()));

    let in_season: Vec<_> = completed
        .into_iter()
        .filter(|g| season.as_deref().map_or(true, |s| g.season == s))
        .collect();
    let table = compute_standings(&in_season);

    envelope(
        &table,
        json!({
            "sport": sport,
            "league": league,
            "season": season,
            "games": in_season.len(),
            "teams": table.len(),
        }),
    )
}

/// GET /api/predictions?game_id=
#[instrument(skip(state))]
pub async fn predictions(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<Json<Value>> {
    let game_id: i64 = parse_value("game_id", required(&params, "game_id")?)?;

    let predictions = state.store.predictions_for_game(game_id).await?;
    let count = predictions.len();
    envelope(predictions, json!({ "game_id": game_id, "count": count }))
}

/// GET /api/live?sport=&data_type=
///
/// Reads through the provider chain instead of the database.
#[instrument(skip(state))]
pub async fn live(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<Json<Value>> {
    let sport = required_sport(&params)?;
    let data_type = parse_optional::<DataType>(&params, "data_type")?.unwrap_or(DataType::Games);

    let key = format!("live:{sport}:{data_type}");
    if let Some(mut cached) = state.route_cache.get(ROUTES_NAMESPACE, &key) {
        if let Some(meta) = cached.get_mut("meta").and_then(Value::as_object_mut) {
            meta.insert("route_cache".to_string(), Value::Bool(true));
        }
        return Ok(Json(cached));
    }

    let outcome = state.chain.fetch(sport, data_type).await;
    if outcome.origin == FetchOrigin::Static && outcome.rows.is_empty() {
        return Err(ApiError::Unavailable(format!(
            "no provider returned {sport} {data_type} and nothing is cached"
        )));
    }

    let rows = clean_rows(outcome.rows);
    let Json(body) = envelope(
        rows_value(&rows)?,
        json!({
            "sport": sport,
            "data_type": data_type,
            "count": rows.len(),
            "origin": outcome.origin,
            "degraded": outcome.degraded,
            "attempts": outcome.attempts,
            "route_cache": false,
        }),
    )?;

    if !outcome.degraded {
        state
            .route_cache
            .set_with_ttl(ROUTES_NAMESPACE, &key, body.clone(), state.live_ttl);
    }
    Ok(Json(body))
}

/// GET /api/providers
pub async fn providers(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let breakers = state.chain.breakers().snapshots().await;
    envelope(
        json!({
            "providers": state.chain.provider_names(),
            "breakers": breakers,
            "cache": {
                "live": state.live_cache.stats(),
                "routes": state.route_cache.stats(),
            },
        }),
        json!({}),
    )
}

/// POST /api/providers/{name}/reset
///
/// Force a provider's breaker closed.
#[instrument(skip(state))]
pub async fn reset_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.chain.provider_names().contains(&name) {
        return Err(ApiError::NotFound(format!("provider '{name}'")));
    }
    let breaker = state.chain.breakers().get(&name);
    breaker.reset().await;
    envelope(breaker.snapshot().await, json!({}))
}

/// POST /api/sync?sport=&data_type=
#[instrument(skip(state))]
pub async fn trigger_sync(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<Json<Value>> {
    let sport = required_sport(&params)?;
    let data_type: DataType = parse_value("data_type", required(&params, "data_type")?)?;

    let report = state.sync.sync(sport, data_type).await?;
    if let Some(failures) = report.upstream_failure() {
        warn!(run_id = %report.run_id, %failures, "Manual sync reached no live provider");
        return Err(ApiError::Upstream(format!(
            "no provider returned {sport} {data_type} ({failures})"
        )));
    }
    let invalidated = state.route_cache.invalidate_namespace(ROUTES_NAMESPACE);
    info!(
        run_id = %report.run_id,
        rows_written = report.rows_written,
        invalidated,
        "Manual sync finished"
    );

    let degraded = report.degraded;
    envelope(report, json!({ "degraded": degraded, "route_cache_invalidated": invalidated }))
}

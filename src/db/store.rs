use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{GameRow, GameStatus, OddsRow, Sport, TeamRow};

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TeamRecord {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub abbreviation: String,
    pub league: String,
    pub sport: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GameRecord {
    pub id: i64,
    pub external_id: Option<String>,
    pub league: String,
    pub sport: String,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub game_date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub season: String,
    pub status: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

impl GameRecord {
    pub fn status(&self) -> GameStatus {
        self.status.parse().unwrap_or(GameStatus::Scheduled)
    }

    /// Final score as (home, away), only for completed games.
    pub fn final_score(&self) -> Option<(i32, i32)> {
        if self.status() != GameStatus::Completed {
            return None;
        }
        Some((self.home_score?, self.away_score?))
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OddsRecord {
    pub id: i64,
    pub game_id: Option<i64>,
    pub source: String,
    pub home_moneyline: Option<Decimal>,
    pub away_moneyline: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub total: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub game_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub game_id: i64,
    pub model_name: String,
    pub prediction_type: String,
    pub predicted_value: f64,
    pub confidence: f64,
    pub actual_value: Option<f64>,
    pub is_correct: Option<bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScrapeLogRecord {
    pub id: i64,
    pub run_id: Uuid,
    pub source: String,
    pub sport: String,
    pub data_type: String,
    pub records_scraped: i32,
    pub records_written: i32,
    pub degraded: bool,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub game_id: i64,
    pub model_name: String,
    /// "winner", "spread" or "total".
    pub prediction_type: String,
    pub predicted_value: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct NewScrapeLog {
    pub run_id: Uuid,
    pub source: String,
    pub sport: Sport,
    pub data_type: String,
    pub records_scraped: i32,
    pub records_written: i32,
    pub degraded: bool,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Filters for [`Store::list_games`]. `team` matches name, abbreviation or "city name".
#[derive(Debug, Clone, Default)]
pub struct GameFilter {
    pub sport: Option<Sport>,
    pub league: Option<String>,
    pub team: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<GameStatus>,
    pub season: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub orphan_games: i64,
    pub orphan_odds: i64,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_games == 0 && self.orphan_odds == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GradeReport {
    pub winner: u64,
    pub spread: u64,
    pub total: u64,
}

/// Largest page any listing query returns.
pub const MAX_LIMIT: i64 = 500;

const GAME_COLUMNS: &str = "SELECT g.id, g.external_id, g.league, g.sport, g.home_team_id, g.away_team_id, \
     ht.name AS home_team, at.name AS away_team, g.game_date, g.start_time, g.season, g.status, \
     g.home_score, g.away_score \
     FROM games g \
     LEFT JOIN teams ht ON ht.id = g.home_team_id \
     LEFT JOIN teams at ON at.id = g.away_team_id";

const ODDS_FIELDS: &str = "o.id, o.game_id, o.source, o.home_moneyline, o.away_moneyline, \
     o.spread, o.total, o.observed_at, ht.name AS home_team, at.name AS away_team, g.game_date";

const ODDS_FROM: &str = "FROM odds o \
     LEFT JOIN games g ON g.id = o.game_id \
     LEFT JOIN teams ht ON ht.id = g.home_team_id \
     LEFT JOIN teams at ON at.id = g.away_team_id";

const TEAM_MATCH: &str = "league = $1 AND (name = $2 OR abbreviation = $2 OR city || ' ' || name = $2)";

impl Store {
    /// Create a Store from an existing pool (shared between the server and the scheduler).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;

        let store = Self { pool };
        if config.run_migrations {
            store.migrate().await?;
        }
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    // --- Upserts ---

    pub async fn upsert_teams(&self, teams: &[TeamRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut written = 0;

        for team in teams {
            let result = sqlx::query(
                "INSERT INTO teams (name, city, abbreviation, league, sport)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (abbreviation, league) DO UPDATE SET
                     name = EXCLUDED.name,
                     city = EXCLUDED.city,
                     sport = EXCLUDED.sport,
                     updated_at = NOW()",
            )
            .bind(&team.name)
            .bind(&team.city)
            .bind(&team.abbreviation)
            .bind(&team.league)
            .bind(team.sport.as_str())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert team {}", team.abbreviation))?;
            written += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit teams")?;
        info!(count = written, "Teams upserted");
        Ok(written)
    }

    /// Upsert games whose teams are both known. Rows naming unknown teams are skipped.
    pub async fn upsert_games(&self, games: &[GameRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut written = 0;
        let mut skipped = 0;

        for game in games {
            let home_id = resolve_team_id(&mut tx, &game.league, &game.home_team).await?;
            let away_id = resolve_team_id(&mut tx, &game.league, &game.away_team).await?;
            let (Some(home_id), Some(away_id)) = (home_id, away_id) else {
                debug!(
                    home = %game.home_team,
                    away = %game.away_team,
                    league = %game.league,
                    "Skipping game with unknown team"
                );
                skipped += 1;
                continue;
            };

            let result = sqlx::query(
                "INSERT INTO games (external_id, league, sport, home_team_id, away_team_id, game_date,
                                    start_time, season, status, home_score, away_score)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (home_team_id, away_team_id, game_date) DO UPDATE SET
                     status = EXCLUDED.status,
                     home_score = COALESCE(EXCLUDED.home_score, games.home_score),
                     away_score = COALESCE(EXCLUDED.away_score, games.away_score),
                     start_time = COALESCE(EXCLUDED.start_time, games.start_time),
                     external_id = COALESCE(EXCLUDED.external_id, games.external_id),
                     updated_at = NOW()",
            )
            .bind(&game.external_id)
            .bind(&game.league)
            .bind(game.sport.as_str())
            .bind(home_id)
            .bind(away_id)
            .bind(game.game_date)
            .bind(game.start_time)
            .bind(&game.season)
            .bind(game.status.as_str())
            .bind(game.home_score)
            .bind(game.away_score)
            .execute(&mut *tx)
            .await
            .context("Failed to upsert game")?;
            written += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit games")?;
        if skipped > 0 {
            warn!(skipped, "Games skipped because a team is not in the database");
        }
        info!(count = written, "Games upserted");
        Ok(written)
    }

    /// Attach each line to the nearest upcoming game between the two teams.
    pub async fn insert_odds(&self, odds: &[OddsRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut written = 0;
        let mut unmatched = 0;

        for row in odds {
            let game_id: Option<i64> = sqlx::query_scalar(
                "SELECT g.id FROM games g
                 JOIN teams ht ON ht.id = g.home_team_id
                 JOIN teams at ON at.id = g.away_team_id
                 WHERE g.league = $1
                   AND (ht.name = $2 OR ht.abbreviation = $2 OR ht.city || ' ' || ht.name = $2)
                   AND (at.name = $3 OR at.abbreviation = $3 OR at.city || ' ' || at.name = $3)
                   AND g.game_date >= CURRENT_DATE
                 ORDER BY g.game_date ASC
                 LIMIT 1",
            )
            .bind(&row.league)
            .bind(&row.home_team)
            .bind(&row.away_team)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to match odds to a game")?;

            let Some(game_id) = game_id else {
                unmatched += 1;
                continue;
            };

            sqlx::query(
                "INSERT INTO odds (game_id, source, home_moneyline, away_moneyline, spread, total, observed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(game_id)
            .bind(&row.source)
            .bind(row.home_moneyline)
            .bind(row.away_moneyline)
            .bind(row.spread)
            .bind(row.total)
            .bind(row.observed_at)
            .execute(&mut *tx)
            .await
            .context("Failed to insert odds")?;
            written += 1;
        }

        tx.commit().await.context("Failed to commit odds")?;
        if unmatched > 0 {
            debug!(unmatched, "Odds rows without an upcoming game");
        }
        info!(count = written, "Odds inserted");
        Ok(written)
    }

    pub async fn upsert_prediction(&self, prediction: &NewPrediction) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO predictions (game_id, model_name, prediction_type, predicted_value, confidence)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (game_id, model_name, prediction_type) DO UPDATE SET
                 predicted_value = EXCLUDED.predicted_value,
                 confidence = EXCLUDED.confidence,
                 updated_at = NOW()",
        )
        .bind(prediction.game_id)
        .bind(&prediction.model_name)
        .bind(&prediction.prediction_type)
        .bind(prediction.predicted_value)
        .bind(prediction.confidence)
        .execute(&self.pool)
        .await
        .context("Failed to upsert prediction")?;
        Ok(result.rows_affected())
    }

    pub async fn log_scrape(&self, log: &NewScrapeLog) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO scrape_logs (run_id, source, sport, data_type, records_scraped,
                                      records_written, degraded, success, error_message)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id",
        )
        .bind(log.run_id)
        .bind(&log.source)
        .bind(log.sport.as_str())
        .bind(&log.data_type)
        .bind(log.records_scraped)
        .bind(log.records_written)
        .bind(log.degraded)
        .bind(log.success)
        .bind(&log.error_message)
        .fetch_one(&self.pool)
        .await
        .context("Failed to log scrape activity")?;
        Ok(id)
    }

    // --- Queries ---

    pub async fn list_teams(
        &self,
        sport: Option<Sport>,
        league: Option<&str>,
    ) -> Result<Vec<TeamRecord>> {
        let teams = sqlx::query_as::<_, TeamRecord>(
            "SELECT id, name, city, abbreviation, league, sport, updated_at FROM teams
             WHERE ($1::TEXT IS NULL OR sport = $1)
               AND ($2::TEXT IS NULL OR league = $2)
             ORDER BY league, name",
        )
        .bind(sport.map(|s| s.as_str()))
        .bind(league)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list teams")?;
        Ok(teams)
    }

    pub async fn list_games(&self, filter: &GameFilter) -> Result<Vec<GameRecord>> {
        let mut query = QueryBuilder::<Postgres>::new(GAME_COLUMNS);
        query.push(" WHERE TRUE");

        if let Some(sport) = filter.sport {
            query.push(" AND g.sport = ").push_bind(sport.as_str());
        }
        if let Some(league) = &filter.league {
            query.push(" AND g.league = ").push_bind(league.clone());
        }
        if let Some(team) = &filter.team {
            query.push(" AND (");
            for (i, alias) in ["ht", "at"].iter().enumerate() {
                if i > 0 {
                    query.push(" OR ");
                }
                query
                    .push(format!("{alias}.name = "))
                    .push_bind(team.clone())
                    .push(format!(" OR {alias}.abbreviation = "))
                    .push_bind(team.clone())
                    .push(format!(" OR {alias}.city || ' ' || {alias}.name = "))
                    .push_bind(team.clone());
            }
            query.push(")");
        }
        if let Some(from) = filter.from {
            query.push(" AND g.game_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND g.game_date <= ").push_bind(to);
        }
        if let Some(status) = filter.status {
            query.push(" AND g.status = ").push_bind(status.as_str());
        }
        if let Some(season) = &filter.season {
            query.push(" AND g.season = ").push_bind(season.clone());
        }

        let limit = filter.limit.unwrap_or(100).clamp(1, MAX_LIMIT);
        query
            .push(" ORDER BY g.game_date DESC, g.id DESC LIMIT ")
            .push_bind(limit);

        let games = query
            .build_query_as::<GameRecord>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list games")?;
        Ok(games)
    }

    pub async fn get_game(&self, id: i64) -> Result<Option<GameRecord>> {
        let game = sqlx::query_as::<_, GameRecord>(&format!("{GAME_COLUMNS} WHERE g.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch game")?;
        Ok(game)
    }

    pub async fn odds_for_game(&self, game_id: i64) -> Result<Vec<OddsRecord>> {
        let odds = sqlx::query_as::<_, OddsRecord>(&format!(
            "SELECT {ODDS_FIELDS} {ODDS_FROM} WHERE o.game_id = $1 ORDER BY o.observed_at DESC"
        ))
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch odds for game")?;
        Ok(odds)
    }

    /// Most recent line per game in `league`, soonest games first.
    pub async fn latest_odds(&self, league: &str, limit: i64) -> Result<Vec<OddsRecord>> {
        let odds = sqlx::query_as::<_, OddsRecord>(&format!(
            "SELECT * FROM (
                 SELECT DISTINCT ON (o.game_id) {ODDS_FIELDS} {ODDS_FROM}
                 WHERE g.league = $1
                 ORDER BY o.game_id, o.observed_at DESC
             ) per_game
             ORDER BY game_date ASC, observed_at DESC
             LIMIT $2"
        ))
        .bind(league)
        .bind(limit.clamp(1, MAX_LIMIT))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch latest odds")?;
        Ok(odds)
    }

    pub async fn predictions_for_game(&self, game_id: i64) -> Result<Vec<PredictionRecord>> {
        let predictions = sqlx::query_as::<_, PredictionRecord>(
            "SELECT id, game_id, model_name, prediction_type, predicted_value, confidence,
                    actual_value, is_correct, created_at
             FROM predictions WHERE game_id = $1
             ORDER BY model_name, prediction_type",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch predictions")?;
        Ok(predictions)
    }

    /// Completed games with final scores, oldest first.
    pub async fn completed_games(
        &self,
        league: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<GameRecord>> {
        let games = sqlx::query_as::<_, GameRecord>(&format!(
            "{GAME_COLUMNS}
             WHERE g.league = $1
               AND g.status = 'completed'
               AND g.home_score IS NOT NULL AND g.away_score IS NOT NULL
               AND ($2::DATE IS NULL OR g.game_date >= $2)
             ORDER BY g.game_date ASC, g.id ASC"
        ))
        .bind(league)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch completed games")?;
        Ok(games)
    }

    /// Scheduled games from today through `days` days ahead.
    pub async fn upcoming_games(&self, days: i64) -> Result<Vec<GameRecord>> {
        let today = Utc::now().date_naive();
        let until = today + Duration::days(days.max(0));
        let games = sqlx::query_as::<_, GameRecord>(&format!(
            "{GAME_COLUMNS}
             WHERE g.status = 'scheduled'
               AND g.game_date BETWEEN $1 AND $2
               AND g.home_team_id IS NOT NULL AND g.away_team_id IS NOT NULL
             ORDER BY g.game_date ASC, g.id ASC"
        ))
        .bind(today)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch upcoming games")?;
        Ok(games)
    }

    pub async fn recent_scrape_logs(&self, limit: i64) -> Result<Vec<ScrapeLogRecord>> {
        let logs = sqlx::query_as::<_, ScrapeLogRecord>(
            "SELECT id, run_id, source, sport, data_type, records_scraped, records_written,
                    degraded, success, error_message, created_at
             FROM scrape_logs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit.clamp(1, MAX_LIMIT))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch scrape logs")?;
        Ok(logs)
    }

    // --- Maintenance ---

    /// Keep the oldest row of every (home, away, date) group.
    pub async fn remove_duplicate_games(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM games WHERE id NOT IN (
                 SELECT MIN(id) FROM games GROUP BY home_team_id, away_team_id, game_date
             )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to remove duplicate games")?;

        let removed = result.rows_affected();
        info!(removed, "Duplicate games removed");
        Ok(removed)
    }

    pub async fn clean_old_odds(&self, days_old: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days_old);
        let result = sqlx::query("DELETE FROM odds WHERE observed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to clean old odds")?;

        let removed = result.rows_affected();
        info!(removed, days_old, "Old odds cleaned");
        Ok(removed)
    }

    pub async fn integrity_report(&self) -> Result<IntegrityReport> {
        let orphan_games: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM games g
             LEFT JOIN teams ht ON g.home_team_id = ht.id
             LEFT JOIN teams at ON g.away_team_id = at.id
             WHERE ht.id IS NULL OR at.id IS NULL",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count orphan games")?;

        let orphan_odds: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM odds o
             LEFT JOIN games g ON o.game_id = g.id
             WHERE g.id IS NULL",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count orphan odds")?;

        let report = IntegrityReport {
            orphan_games,
            orphan_odds,
        };
        if report.is_clean() {
            info!("Data integrity check passed");
        } else {
            warn!(orphan_games, orphan_odds, "Data integrity problems found");
        }
        Ok(report)
    }

    /// Score ungraded predictions against final results.
    pub async fn grade_predictions(&self) -> Result<GradeReport> {
        const COMPLETED: &str = "FROM games g
             WHERE p.game_id = g.id
               AND g.status = 'completed'
               AND g.home_score IS NOT NULL
               AND g.away_score IS NOT NULL
               AND p.actual_value IS NULL";

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let winner = sqlx::query(&format!(
            "UPDATE predictions p SET
                 actual_value = CASE WHEN g.home_score > g.away_score THEN 1 ELSE 0 END,
                 is_correct = ((p.predicted_value > 0.5) = (g.home_score > g.away_score)),
                 updated_at = NOW()
             {COMPLETED} AND p.prediction_type = 'winner'"
        ))
        .execute(&mut *tx)
        .await
        .context("Failed to grade winner predictions")?
        .rows_affected();

        let spread = sqlx::query(&format!(
            "UPDATE predictions p SET
                 actual_value = g.home_score - g.away_score,
                 is_correct = ABS(p.predicted_value - (g.home_score - g.away_score)) <= 3,
                 updated_at = NOW()
             {COMPLETED} AND p.prediction_type = 'spread'"
        ))
        .execute(&mut *tx)
        .await
        .context("Failed to grade spread predictions")?
        .rows_affected();

        let total = sqlx::query(&format!(
            "UPDATE predictions p SET
                 actual_value = g.home_score + g.away_score,
                 is_correct = ABS(p.predicted_value - (g.home_score + g.away_score)) <= 5,
                 updated_at = NOW()
             {COMPLETED} AND p.prediction_type = 'total'"
        ))
        .execute(&mut *tx)
        .await
        .context("Failed to grade total predictions")?
        .rows_affected();

        tx.commit().await.context("Failed to commit grading")?;

        let report = GradeReport {
            winner,
            spread,
            total,
        };
        info!(?report, "Predictions graded");
        Ok(report)
    }
}

async fn resolve_team_id(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    league: &str,
    name: &str,
) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar(&format!(
        "SELECT id FROM teams WHERE {TEAM_MATCH} ORDER BY id LIMIT 1"
    ))
    .bind(league)
    .bind(name)
    .fetch_optional(&mut **tx)
    .await
    .with_context(|| format!("Failed to resolve team {name}"))?;
    Ok(id)
}

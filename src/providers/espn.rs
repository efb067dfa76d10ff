//! ESPN public site API.
//!
//! Serves team directories and daily scoreboards (schedule plus final scores)
//! for every supported sport. No API key required.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::clean;
use crate::models::{CanonicalRows, DataType, GameRow, GameStatus, Sport, TeamRow};
use crate::providers::{get_json, ProviderError, SportsProvider};
use crate::resilience::RequestGovernor;

pub const PROVIDER_NAME: &str = "espn";

/// ESPN path segment for each sport's default league.
fn sport_path(sport: Sport) -> &'static str {
    match sport {
        Sport::Basketball => "basketball/nba",
        Sport::Football => "football/nfl",
        Sport::Baseball => "baseball/mlb",
        Sport::Hockey => "hockey/nhl",
        Sport::Soccer => "soccer/usa.1",
    }
}

pub struct EspnProvider {
    client: reqwest::Client,
    base_url: String,
    governor: RequestGovernor,
    days_back: u32,
    days_ahead: u32,
}

impl EspnProvider {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        governor: RequestGovernor,
        days_back: u32,
        days_ahead: u32,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            governor,
            days_back,
            days_ahead,
        })
    }

    async fn fetch_teams(&self, sport: Sport) -> Result<Vec<TeamRow>, ProviderError> {
        let url = format!("{}/{}/teams", self.base_url, sport_path(sport));
        let response: EspnTeamsResponse = self
            .governor
            .run(|| get_json(self.client.get(&url)))
            .await?;

        let league = sport.default_league().to_string();
        let teams = response
            .sports
            .into_iter()
            .flat_map(|s| s.leagues)
            .flat_map(|l| l.teams)
            .map(|entry| {
                let team = entry.team;
                TeamRow {
                    name: team.name.unwrap_or_else(|| team.display_name.clone()),
                    city: team.location.unwrap_or_default(),
                    abbreviation: team.abbreviation,
                    league: league.clone(),
                    sport,
                }
            })
            .collect();

        Ok(teams)
    }

    async fn fetch_scoreboard(
        &self,
        sport: Sport,
        date: NaiveDate,
    ) -> Result<EspnScoreboard, ProviderError> {
        let url = format!("{}/{}/scoreboard", self.base_url, sport_path(sport));
        let dates = date.format("%Y%m%d").to_string();
        self.governor
            .run(|| get_json(self.client.get(&url).query(&[("dates", dates.as_str())])))
            .await
    }

    async fn fetch_games(&self, sport: Sport) -> Result<Vec<GameRow>, ProviderError> {
        let today = Utc::now().date_naive();
        let start = today
            .checked_sub_days(Days::new(u64::from(self.days_back)))
            .unwrap_or(today);
        let span = self.days_back + self.days_ahead.max(1);

        let mut seen = HashSet::new();
        let mut games = Vec::new();

        for offset in 0..span {
            let Some(date) = start.checked_add_days(Days::new(u64::from(offset))) else {
                continue;
            };
            let scoreboard = self.fetch_scoreboard(sport, date).await?;
            debug!(sport = %sport, %date, events = scoreboard.events.len(), "ESPN scoreboard fetched");

            for event in scoreboard.events {
                if !seen.insert(event.id.clone()) {
                    continue;
                }
                if let Some(game) = event_to_game(sport, date, event) {
                    games.push(game);
                }
            }
        }

        Ok(games)
    }
}

#[async_trait]
impl SportsProvider for EspnProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports(&self, _sport: Sport, data_type: DataType) -> bool {
        matches!(data_type, DataType::Teams | DataType::Games)
    }

    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn fetch(
        &self,
        sport: Sport,
        data_type: DataType,
    ) -> Result<CanonicalRows, ProviderError> {
        match data_type {
            DataType::Teams => Ok(CanonicalRows::Teams(self.fetch_teams(sport).await?)),
            DataType::Games => Ok(CanonicalRows::Games(self.fetch_games(sport).await?)),
            DataType::Odds => Err(ProviderError::Unsupported {
                provider: PROVIDER_NAME.to_string(),
                sport,
                data_type,
            }),
        }
    }
}

fn event_to_game(sport: Sport, date: NaiveDate, event: EspnEvent) -> Option<GameRow> {
    let competition = event.competitions.into_iter().next()?;

    let mut home = None;
    let mut away = None;
    for competitor in competition.competitors {
        match competitor.home_away.as_str() {
            "home" => home = Some(competitor),
            "away" => away = Some(competitor),
            _ => {}
        }
    }
    let (home, away) = (home?, away?);

    let status = competition
        .status
        .map(|s| status_from_espn(&s.type_detail))
        .unwrap_or(GameStatus::Scheduled);

    // ESPN reports "0" for games that have not started.
    let (home_score, away_score) = if status == GameStatus::Scheduled {
        (None, None)
    } else {
        (parse_score(home.score.as_deref()), parse_score(away.score.as_deref()))
    };

    Some(GameRow {
        external_id: Some(event.id),
        league: sport.default_league().to_string(),
        sport,
        home_team: home.team.short_name(),
        away_team: away.team.short_name(),
        game_date: date,
        start_time: clean::parse_datetime(&event.date),
        season: sport.season_for(date),
        status,
        home_score,
        away_score,
    })
}

fn status_from_espn(status: &EspnStatusType) -> GameStatus {
    let description = status.description.to_ascii_lowercase();
    if description.contains("postponed") || description.contains("canceled") {
        return GameStatus::Postponed;
    }
    if status.completed {
        return GameStatus::Completed;
    }
    status.state.parse().unwrap_or(GameStatus::Scheduled)
}

fn parse_score(raw: Option<&str>) -> Option<i32> {
    raw.and_then(|s| s.trim().parse::<i32>().ok())
}

// --- ESPN API Response Types ---

#[derive(Debug, Deserialize)]
struct EspnTeamsResponse {
    #[serde(default)]
    sports: Vec<EspnSportEntry>,
}

#[derive(Debug, Deserialize)]
struct EspnSportEntry {
    #[serde(default)]
    leagues: Vec<EspnLeagueEntry>,
}

#[derive(Debug, Deserialize)]
struct EspnLeagueEntry {
    #[serde(default)]
    teams: Vec<EspnTeamEntry>,
}

#[derive(Debug, Deserialize)]
struct EspnTeamEntry {
    team: EspnTeam,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EspnTeam {
    display_name: String,
    abbreviation: String,
    name: Option<String>,
    location: Option<String>,
    short_display_name: Option<String>,
}

impl EspnTeam {
    fn short_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.short_display_name.clone())
            .unwrap_or_else(|| self.display_name.clone())
    }
}

#[derive(Debug, Deserialize)]
struct EspnScoreboard {
    #[serde(default)]
    events: Vec<EspnEvent>,
}

#[derive(Debug, Deserialize)]
struct EspnEvent {
    id: String,
    date: String,
    #[serde(default)]
    competitions: Vec<EspnCompetition>,
}

#[derive(Debug, Deserialize)]
struct EspnCompetition {
    #[serde(default)]
    competitors: Vec<EspnCompetitor>,
    status: Option<EspnStatus>,
}

#[derive(Debug, Deserialize)]
struct EspnCompetitor {
    team: EspnTeam,
    score: Option<String>,
    #[serde(rename = "homeAway")]
    home_away: String,
}

#[derive(Debug, Deserialize)]
struct EspnStatus {
    #[serde(rename = "type")]
    type_detail: EspnStatusType,
}

#[derive(Debug, Deserialize)]
struct EspnStatusType {
    #[serde(default)]
    state: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    completed: bool,
}

//! Canonical, provider-independent row types.
//!
//! Every provider adapter normalizes into these shapes before anything is
//! cached, cleaned, or written to the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Basketball,
    Football,
    Baseball,
    Hockey,
    Soccer,
}

impl Sport {
    pub const ALL: [Sport; 5] = [
        Sport::Basketball,
        Sport::Football,
        Sport::Baseball,
        Sport::Hockey,
        Sport::Soccer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basketball => "basketball",
            Self::Football => "football",
            Self::Baseball => "baseball",
            Self::Hockey => "hockey",
            Self::Soccer => "soccer",
        }
    }

    /// League synced by default for this sport.
    pub fn default_league(&self) -> &'static str {
        match self {
            Self::Basketball => "nba",
            Self::Football => "nfl",
            Self::Baseball => "mlb",
            Self::Hockey => "nhl",
            Self::Soccer => "mls",
        }
    }

    /// Average combined score, used as the neutral prior for totals.
    pub fn typical_total(&self) -> f64 {
        match self {
            Self::Basketball => 220.0,
            Self::Football => 44.0,
            Self::Baseball => 9.0,
            Self::Hockey => 6.0,
            Self::Soccer => 2.8,
        }
    }

    /// Season label for a game on `date`.
    ///
    /// Winter leagues span two calendar years ("2024-25"); the NFL season is
    /// named for the year it starts; everything else uses the calendar year.
    pub fn season_for(&self, date: NaiveDate) -> String {
        let year = date.year();
        match self {
            Self::Basketball | Self::Hockey => {
                let start = if date.month() >= 9 { year } else { year - 1 };
                format!("{}-{:02}", start, (start + 1) % 100)
            }
            Self::Football => {
                let start = if date.month() >= 3 { year } else { year - 1 };
                start.to_string()
            }
            Self::Baseball | Self::Soccer => year.to_string(),
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basketball" | "nba" => Ok(Self::Basketball),
            "football" | "nfl" | "americanfootball" => Ok(Self::Football),
            "baseball" | "mlb" => Ok(Self::Baseball),
            "hockey" | "nhl" | "icehockey" => Ok(Self::Hockey),
            "soccer" | "mls" => Ok(Self::Soccer),
            other => Err(format!("unknown sport '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Teams,
    Games,
    Odds,
}

impl DataType {
    pub const ALL: [DataType; 3] = [DataType::Teams, DataType::Games, DataType::Odds];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teams => "teams",
            Self::Games => "games",
            Self::Odds => "odds",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teams" => Ok(Self::Teams),
            "games" | "schedule" | "scores" => Ok(Self::Games),
            "odds" => Ok(Self::Odds),
            other => Err(format!("unknown data type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Completed,
    Postponed,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Postponed => "postponed",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" | "pre" => Ok(Self::Scheduled),
            "in_progress" | "in" | "live" => Ok(Self::InProgress),
            "completed" | "post" | "final" => Ok(Self::Completed),
            "postponed" | "canceled" | "cancelled" => Ok(Self::Postponed),
            other => Err(format!("unknown game status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRow {
    pub name: String,
    pub city: String,
    pub abbreviation: String,
    pub league: String,
    pub sport: Sport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRow {
    pub external_id: Option<String>,
    pub league: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub game_date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub season: String,
    pub status: GameStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRow {
    pub league: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub source: String,
    pub home_moneyline: Option<Decimal>,
    pub away_moneyline: Option<Decimal>,
    /// Home-team point spread.
    pub spread: Option<Decimal>,
    pub total: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
}

/// Rows produced by a single provider fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "rows", rename_all = "lowercase")]
pub enum CanonicalRows {
    Teams(Vec<TeamRow>),
    Games(Vec<GameRow>),
    Odds(Vec<OddsRow>),
}

impl CanonicalRows {
    pub fn empty(data_type: DataType) -> Self {
        match data_type {
            DataType::Teams => Self::Teams(Vec::new()),
            DataType::Games => Self::Games(Vec::new()),
            DataType::Odds => Self::Odds(Vec::new()),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Teams(_) => DataType::Teams,
            Self::Games(_) => DataType::Games,
            Self::Odds(_) => DataType::Odds,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Teams(rows) => rows.len(),
            Self::Games(rows) => rows.len(),
            Self::Odds(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Normalization and validation of scraped rows before they reach the store.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{CanonicalRows, GameRow, OddsRow, TeamRow};

/// Known long/short forms mapped to the canonical short team name.
const TEAM_ALIASES: &[(&str, &str)] = &[
    ("LA Lakers", "Lakers"),
    ("Los Angeles Lakers", "Lakers"),
    ("Golden State Warriors", "Warriors"),
    ("GS Warriors", "Warriors"),
    ("Boston Celtics", "Celtics"),
    ("Miami Heat", "Heat"),
    ("New York Knicks", "Knicks"),
    ("NY Knicks", "Knicks"),
    ("Chicago Bulls", "Bulls"),
    ("Brooklyn Nets", "Nets"),
    ("Los Angeles Clippers", "Clippers"),
    ("LA Clippers", "Clippers"),
    ("Philadelphia 76ers", "76ers"),
    ("Phila 76ers", "76ers"),
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%dT%H:%M:%SZ",
];

pub fn normalize_team_name(raw: &str) -> String {
    let trimmed = raw.trim();
    TEAM_ALIASES
        .iter()
        .find(|(alias, _)| *alias == trimmed)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

fn is_placeholder(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "" | "n/a" | "na" | "tbd" | "-" | "off"
    )
}

/// American moneyline, e.g. "+150", "-110", "−120 (DK)".
pub fn parse_moneyline(raw: &str) -> Option<Decimal> {
    if is_placeholder(raw) {
        return None;
    }

    let cleaned: String = raw
        .replace('\u{2212}', "-")
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    match cleaned.parse::<Decimal>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(value = raw, "Invalid odds value");
            None
        }
    }
}

/// Home point spread. "PK"/"pick" is zero.
pub fn parse_spread(raw: &str) -> Option<Decimal> {
    let lower = raw.trim().to_ascii_lowercase();
    if lower == "pk" || lower == "pick" || lower == "pick'em" || lower == "ev" {
        return Some(Decimal::ZERO);
    }
    first_number(raw, true)
}

/// Over/under line, e.g. "O 228.5", "u221".
pub fn parse_total(raw: &str) -> Option<Decimal> {
    first_number(raw, false).map(|v| v.abs())
}

fn first_number(raw: &str, signed: bool) -> Option<Decimal> {
    if is_placeholder(raw) {
        return None;
    }
    let normalized = raw.replace('\u{2212}', "-").replace('½', ".5");
    let chars: Vec<char> = normalized.chars().collect();

    let start = chars.iter().position(|c| c.is_ascii_digit())?;
    let mut end = start;
    while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
        end += 1;
    }

    let mut number: String = chars[start..end].iter().collect();
    if signed && start > 0 && chars[start - 1] == '-' {
        number.insert(0, '-');
    }
    number.trim_end_matches('.').parse::<Decimal>().ok()
}

/// Parse a date or date-time in any of the formats scrapers encounter.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    debug!(value = raw, "Unrecognized date format");
    None
}

/// Like [`parse_date`], interpreting naive values as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    parse_date(raw).map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatLine {
    pub player_name: String,
    pub position: String,
    pub points: f64,
    pub rebounds: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    pub turnovers: f64,
    pub minutes_played: f64,
}

/// Validate a scraped box-score line. Name and position are required;
/// counting stats are clamped to zero and unreadable values become zero.
pub fn clean_player_stats(
    raw: &serde_json::Map<String, serde_json::Value>,
) -> Option<PlayerStatLine> {
    let required = |field: &str| -> Option<String> {
        let value = match raw.get(field)? {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        if value.is_empty() {
            warn!(field, "Missing required player stat field");
            None
        } else {
            Some(value)
        }
    };

    let stat = |field: &str| -> f64 {
        let value = match raw.get(field) {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        if value.is_finite() {
            value.max(0.0)
        } else {
            0.0
        }
    };

    Some(PlayerStatLine {
        player_name: required("player_name")?,
        position: required("position")?,
        points: stat("points"),
        rebounds: stat("rebounds"),
        assists: stat("assists"),
        steals: stat("steals"),
        blocks: stat("blocks"),
        turnovers: stat("turnovers"),
        minutes_played: stat("minutes_played"),
    })
}

/// Normalize team names, drop incomplete rows and collapse duplicates.
pub fn clean_rows(rows: CanonicalRows) -> CanonicalRows {
    let before = rows.len();
    let cleaned = match rows {
        CanonicalRows::Teams(teams) => CanonicalRows::Teams(clean_teams(teams)),
        CanonicalRows::Games(games) => CanonicalRows::Games(clean_games(games)),
        CanonicalRows::Odds(odds) => CanonicalRows::Odds(clean_odds(odds)),
    };

    if cleaned.len() != before {
        debug!(
            data_type = %cleaned.data_type(),
            before,
            after = cleaned.len(),
            "Dropped invalid or duplicate rows"
        );
    }
    cleaned
}

fn clean_teams(teams: Vec<TeamRow>) -> Vec<TeamRow> {
    let mut seen = HashSet::new();
    teams
        .into_iter()
        .filter_map(|mut team| {
            team.name = normalize_team_name(&team.name);
            team.city = team.city.trim().to_string();
            team.abbreviation = team.abbreviation.trim().to_ascii_uppercase();
            if team.name.is_empty() || team.abbreviation.is_empty() {
                return None;
            }
            seen.insert((team.abbreviation.clone(), team.league.clone()))
                .then_some(team)
        })
        .collect()
}

fn clean_games(games: Vec<GameRow>) -> Vec<GameRow> {
    let mut seen = HashSet::new();
    games
        .into_iter()
        .filter_map(|mut game| {
            game.home_team = normalize_team_name(&game.home_team);
            game.away_team = normalize_team_name(&game.away_team);
            if game.home_team.is_empty()
                || game.away_team.is_empty()
                || game.home_team == game.away_team
            {
                return None;
            }
            if game.home_score.is_some_and(|s| s < 0) || game.away_score.is_some_and(|s| s < 0) {
                game.home_score = None;
                game.away_score = None;
            }
            seen.insert((game.home_team.clone(), game.away_team.clone(), game.game_date))
                .then_some(game)
        })
        .collect()
}

fn clean_odds(odds: Vec<OddsRow>) -> Vec<OddsRow> {
    odds.into_iter()
        .filter_map(|mut row| {
            row.home_team = normalize_team_name(&row.home_team);
            row.away_team = normalize_team_name(&row.away_team);
            if row.home_team.is_empty() || row.away_team.is_empty() {
                return None;
            }
            let has_line = row.home_moneyline.is_some()
                || row.away_moneyline.is_some()
                || row.spread.is_some()
                || row.total.is_some();
            has_line.then_some(row)
        })
        .collect()
}

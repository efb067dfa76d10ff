//! The Odds API (v4) adapter.
//!
//! Requests moneyline, spread and total markets in American format and keeps,
//! per market, the first bookmaker that quotes it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::clean;
use crate::models::{CanonicalRows, DataType, OddsRow, Sport};
use crate::providers::{get_json, ProviderError, SportsProvider};
use crate::resilience::RequestGovernor;

pub const PROVIDER_NAME: &str = "odds_api";

fn sport_key(sport: Sport) -> &'static str {
    match sport {
        Sport::Basketball => "basketball_nba",
        Sport::Football => "americanfootball_nfl",
        Sport::Baseball => "baseball_mlb",
        Sport::Hockey => "icehockey_nhl",
        Sport::Soccer => "soccer_usa_mls",
    }
}

pub struct OddsApiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    regions: String,
    governor: RequestGovernor,
}

impl OddsApiProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        regions: &str,
        timeout: Duration,
        governor: RequestGovernor,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            regions: regions.to_string(),
            governor,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_odds(&self, sport: Sport) -> Result<Vec<OddsRow>, ProviderError> {
        let Some(api_key) = self.api_key.as_ref() else {
            return Err(ProviderError::NotConfigured(
                "ODDS_API_KEY is not set".to_string(),
            ));
        };

        let url = format!("{}/v4/sports/{}/odds", self.base_url, sport_key(sport));
        let events: Vec<OddsEvent> = self
            .governor
            .run(|| {
                get_json(self.client.get(&url).query(&[
                    ("apiKey", api_key.expose_secret()),
                    ("regions", self.regions.as_str()),
                    ("markets", "h2h,spreads,totals"),
                    ("oddsFormat", "american"),
                ]))
            })
            .await?;

        debug!(sport = %sport, events = events.len(), "Odds API events fetched");

        let observed_at = Utc::now();
        Ok(events
            .into_iter()
            .map(|event| event_to_odds(sport, event, observed_at))
            .collect())
    }
}

#[async_trait]
impl SportsProvider for OddsApiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports(&self, _sport: Sport, data_type: DataType) -> bool {
        data_type == DataType::Odds && self.is_configured()
    }

    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn fetch(
        &self,
        sport: Sport,
        data_type: DataType,
    ) -> Result<CanonicalRows, ProviderError> {
        if data_type != DataType::Odds {
            return Err(ProviderError::Unsupported {
                provider: PROVIDER_NAME.to_string(),
                sport,
                data_type,
            });
        }
        Ok(CanonicalRows::Odds(self.fetch_odds(sport).await?))
    }
}

fn event_to_odds(sport: Sport, event: OddsEvent, observed_at: DateTime<Utc>) -> OddsRow {
    let mut row = OddsRow {
        league: sport.default_league().to_string(),
        sport,
        home_team: clean::normalize_team_name(&event.home_team),
        away_team: clean::normalize_team_name(&event.away_team),
        source: PROVIDER_NAME.to_string(),
        home_moneyline: None,
        away_moneyline: None,
        spread: None,
        total: None,
        observed_at,
    };

    let mut sources = Vec::new();
    for bookmaker in &event.bookmakers {
        let mut used = false;
        for market in &bookmaker.markets {
            match market.key.as_str() {
                "h2h" if row.home_moneyline.is_none() => {
                    row.home_moneyline = outcome_price(market, &event.home_team);
                    row.away_moneyline = outcome_price(market, &event.away_team);
                    used = true;
                }
                "spreads" if row.spread.is_none() => {
                    row.spread = market
                        .outcomes
                        .iter()
                        .find(|o| o.name == event.home_team)
                        .and_then(|o| line_text(&o.point))
                        .and_then(|text| clean::parse_spread(&text));
                    used = true;
                }
                "totals" if row.total.is_none() => {
                    row.total = market
                        .outcomes
                        .iter()
                        .find_map(|o| line_text(&o.point))
                        .and_then(|text| clean::parse_total(&text));
                    used = true;
                }
                _ => {}
            }
        }
        if used {
            sources.push(bookmaker.key.clone());
        }
    }

    if !sources.is_empty() {
        row.source = format!("{PROVIDER_NAME}:{}", sources.join("+"));
    }
    row
}

fn outcome_price(market: &OddsMarket, team: &str) -> Option<Decimal> {
    market
        .outcomes
        .iter()
        .find(|o| o.name == team)
        .and_then(|o| line_text(&o.price))
        .and_then(|text| clean::parse_moneyline(&text))
}

/// Books quote lines as JSON numbers or as strings ("+150", "PK", "N/A").
fn line_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

// --- Odds API response types ---

#[derive(Debug, Deserialize)]
struct OddsEvent {
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize)]
struct Bookmaker {
    key: String,
    #[serde(default)]
    markets: Vec<OddsMarket>,
}

#[derive(Debug, Deserialize)]
struct OddsMarket {
    key: String,
    #[serde(default)]
    outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    name: String,
    #[serde(default)]
    price: serde_json::Value,
    #[serde(default)]
    point: serde_json::Value,
}

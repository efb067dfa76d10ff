//! Built-in degraded data, the last link of every fallback chain.
//!
//! Teams come from a compiled-in directory; games and odds are always empty
//! because stale schedules and lines are worse than none.

use async_trait::async_trait;

use crate::models::{CanonicalRows, DataType, Sport, TeamRow};
use crate::providers::{ProviderError, SportsProvider};

pub const PROVIDER_NAME: &str = "static";

// (city, name, abbreviation)
const NBA_TEAMS: &[(&str, &str, &str)] = &[
    ("Atlanta", "Hawks", "ATL"),
    ("Boston", "Celtics", "BOS"),
    ("Brooklyn", "Nets", "BKN"),
    ("Charlotte", "Hornets", "CHA"),
    ("Chicago", "Bulls", "CHI"),
    ("Cleveland", "Cavaliers", "CLE"),
    ("Dallas", "Mavericks", "DAL"),
    ("Denver", "Nuggets", "DEN"),
    ("Detroit", "Pistons", "DET"),
    ("Golden State", "Warriors", "GS"),
    ("Houston", "Rockets", "HOU"),
    ("Indiana", "Pacers", "IND"),
    ("LA", "Clippers", "LAC"),
    ("Los Angeles", "Lakers", "LAL"),
    ("Memphis", "Grizzlies", "MEM"),
    ("Miami", "Heat", "MIA"),
    ("Milwaukee", "Bucks", "MIL"),
    ("Minnesota", "Timberwolves", "MIN"),
    ("New Orleans", "Pelicans", "NO"),
    ("New York", "Knicks", "NY"),
    ("Oklahoma City", "Thunder", "OKC"),
    ("Orlando", "Magic", "ORL"),
    ("Philadelphia", "76ers", "PHI"),
    ("Phoenix", "Suns", "PHX"),
    ("Portland", "Trail Blazers", "POR"),
    ("Sacramento", "Kings", "SAC"),
    ("San Antonio", "Spurs", "SA"),
    ("Toronto", "Raptors", "TOR"),
    ("Utah", "Jazz", "UTAH"),
    ("Washington", "Wizards", "WSH"),
];

const NHL_TEAMS: &[(&str, &str, &str)] = &[
    ("Boston", "Bruins", "BOS"),
    ("Chicago", "Blackhawks", "CHI"),
    ("Colorado", "Avalanche", "COL"),
    ("Detroit", "Red Wings", "DET"),
    ("Edmonton", "Oilers", "EDM"),
    ("Florida", "Panthers", "FLA"),
    ("Montreal", "Canadiens", "MTL"),
    ("New York", "Rangers", "NYR"),
    ("Pittsburgh", "Penguins", "PIT"),
    ("Tampa Bay", "Lightning", "TB"),
    ("Toronto", "Maple Leafs", "TOR"),
    ("Vegas", "Golden Knights", "VGK"),
];

fn seed_teams(sport: Sport) -> &'static [(&'static str, &'static str, &'static str)] {
    match sport {
        Sport::Basketball => NBA_TEAMS,
        Sport::Hockey => NHL_TEAMS,
        _ => &[],
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StaticProvider;

impl StaticProvider {
    pub fn new() -> Self {
        Self
    }

    /// Degraded rows for a request. Never fails.
    pub fn rows(&self, sport: Sport, data_type: DataType) -> CanonicalRows {
        match data_type {
            DataType::Teams => CanonicalRows::Teams(
                seed_teams(sport)
                    .iter()
                    .map(|(city, name, abbreviation)| TeamRow {
                        name: (*name).to_string(),
                        city: (*city).to_string(),
                        abbreviation: (*abbreviation).to_string(),
                        league: sport.default_league().to_string(),
                        sport,
                    })
                    .collect(),
            ),
            other => CanonicalRows::empty(other),
        }
    }
}

#[async_trait]
impl SportsProvider for StaticProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports(&self, _sport: Sport, _data_type: DataType) -> bool {
        true
    }

    async fn fetch(
        &self,
        sport: Sport,
        data_type: DataType,
    ) -> Result<CanonicalRows, ProviderError> {
        Ok(self.rows(sport, data_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nba_directory_is_complete() {
        let rows = StaticProvider::new().rows(Sport::Basketball, DataType::Teams);
        let CanonicalRows::Teams(teams) = rows else {
            panic!("expected teams");
        };
        assert_eq!(teams.len(), 30);
        assert!(teams.iter().all(|t| t.league == "nba"));
        assert!(teams.iter().any(|t| t.name == "Lakers" && t.abbreviation == "LAL"));
    }

    #[tokio::test]
    async fn test_games_and_odds_are_empty() {
        let provider = StaticProvider::new();
        let games = provider.fetch(Sport::Football, DataType::Games).await.unwrap();
        assert_eq!(games, CanonicalRows::Games(Vec::new()));
        let odds = provider.fetch(Sport::Basketball, DataType::Odds).await.unwrap();
        assert!(odds.is_empty());
    }
}

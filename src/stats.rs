//! Win percentages and league standings computed from completed games.

use std::collections::HashMap;

use serde::Serialize;

use crate::db::GameRecord;

/// Share of decided games won. Zero when no games were played.
pub fn win_pct(wins: u32, losses: u32) -> f64 {
    let games = wins + losses;
    if games == 0 {
        0.0
    } else {
        f64::from(wins) / f64::from(games)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandingRow {
    pub team_id: i64,
    pub team: String,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub win_pct: f64,
    pub points_for: i64,
    pub points_against: i64,
    pub point_differential: i64,
    pub home_record: String,
    pub away_record: String,
    /// Record over the most recent ten games, e.g. "7-3".
    pub last_ten: String,
    /// Current run of identical results, e.g. "W3". Empty before the first game.
    pub streak: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Win,
    Loss,
    Tie,
}

impl Outcome {
    fn letter(self) -> char {
        match self {
            Self::Win => 'W',
            Self::Loss => 'L',
            Self::Tie => 'T',
        }
    }
}

#[derive(Default)]
struct Tally {
    team: String,
    wins: u32,
    losses: u32,
    ties: u32,
    points_for: i64,
    points_against: i64,
    home: (u32, u32),
    away: (u32, u32),
    results: Vec<Outcome>,
}

impl Tally {
    fn record(&mut self, scored: i32, allowed: i32, at_home: bool) {
        self.points_for += i64::from(scored);
        self.points_against += i64::from(allowed);

        let result = match scored.cmp(&allowed) {
            std::cmp::Ordering::Greater => Outcome::Win,
            std::cmp::Ordering::Less => Outcome::Loss,
            std::cmp::Ordering::Equal => Outcome::Tie,
        };
        let split = if at_home { &mut self.home } else { &mut self.away };
        match result {
            Outcome::Win => {
                self.wins += 1;
                split.0 += 1;
            }
            Outcome::Loss => {
                self.losses += 1;
                split.1 += 1;
            }
            Outcome::Tie => self.ties += 1,
        }
        self.results.push(result);
    }

    fn into_row(self, team_id: i64) -> StandingRow {
        let games_played = self.wins + self.losses + self.ties;
        let win_pct = if games_played == 0 {
            0.0
        } else {
            (f64::from(self.wins) + 0.5 * f64::from(self.ties)) / f64::from(games_played)
        };

        let recent = &self.results[self.results.len().saturating_sub(10)..];
        let recent_wins = recent.iter().filter(|r| **r == Outcome::Win).count();
        let recent_losses = recent.iter().filter(|r| **r == Outcome::Loss).count();

        let streak = match self.results.last() {
            Some(last) => {
                let run = self.results.iter().rev().take_while(|r| *r == last).count();
                format!("{}{}", last.letter(), run)
            }
            None => String::new(),
        };

        StandingRow {
            team_id,
            team: self.team,
            games_played,
            wins: self.wins,
            losses: self.losses,
            ties: self.ties,
            win_pct,
            points_for: self.points_for,
            points_against: self.points_against,
            point_differential: self.points_for - self.points_against,
            home_record: format!("{}-{}", self.home.0, self.home.1),
            away_record: format!("{}-{}", self.away.0, self.away.1),
            last_ten: format!("{recent_wins}-{recent_losses}"),
            streak,
        }
    }
}

/// Build standings from completed games. Games without a final score or
/// without both team ids are ignored; input order does not matter.
///
/// Sorted by win percentage, then point differential, then team name.
pub fn compute_standings(games: &[GameRecord]) -> Vec<StandingRow> {
    let mut ordered: Vec<&GameRecord> = games.iter().collect();
    ordered.sort_by_key(|g| (g.game_date, g.id));

    let mut tallies: HashMap<i64, Tally> = HashMap::new();
    for game in ordered {
        let (Some((home_score, away_score)), Some(home_id), Some(away_id)) =
            (game.final_score(), game.home_team_id, game.away_team_id)
        else {
            continue;
        };

        let home = tallies.entry(home_id).or_default();
        if home.team.is_empty() {
            home.team = game.home_team.clone().unwrap_or_default();
        }
        home.record(home_score, away_score, true);

        let away = tallies.entry(away_id).or_default();
        if away.team.is_empty() {
            away.team = game.away_team.clone().unwrap_or_default();
        }
        away.record(away_score, home_score, false);
    }

    let mut rows: Vec<StandingRow> = tallies
        .into_iter()
        .map(|(team_id, tally)| tally.into_row(team_id))
        .collect();

    rows.sort_by(|a, b| {
        b.win_pct
            .total_cmp(&a.win_pct)
            .then(b.point_differential.cmp(&a.point_differential))
            .then_with(|| a.team.cmp(&b.team))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn game(id: i64, day: u32, home: (i64, &str, i32), away: (i64, &str, i32)) -> GameRecord {
        GameRecord {
            id,
            external_id: None,
            league: "nba".into(),
            sport: "basketball".into(),
            home_team_id: Some(home.0),
            away_team_id: Some(away.0),
            home_team: Some(home.1.into()),
            away_team: Some(away.1.into()),
            game_date: NaiveDate::from_ymd_opt(2024, 11, day).unwrap(),
            start_time: None,
            season: "2024-25".into(),
            status: "completed".into(),
            home_score: Some(home.2),
            away_score: Some(away.2),
        }
    }

    #[test]
    fn test_win_pct() {
        assert_eq!(win_pct(0, 0), 0.0);
        assert_eq!(win_pct(3, 1), 0.75);
        assert_eq!(win_pct(0, 4), 0.0);
    }

    #[test]
    fn test_standings_order_and_records() {
        let games = vec![
            game(1, 1, (1, "Celtics", 110), (2, "Knicks", 100)),
            game(2, 2, (2, "Knicks", 105), (3, "Heat", 99)),
            game(3, 3, (3, "Heat", 90), (1, "Celtics", 120)),
        ];
        let standings = compute_standings(&games);

        assert_eq!(standings.len(), 3);
        assert_eq!(standings[0].team, "Celtics");
        assert_eq!(standings[0].wins, 2);
        assert_eq!(standings[0].win_pct, 1.0);
        assert_eq!(standings[0].point_differential, 40);
        assert_eq!(standings[0].home_record, "1-0");
        assert_eq!(standings[0].away_record, "1-0");
        assert_eq!(standings[0].streak, "W2");

        assert_eq!(standings[1].team, "Knicks");
        assert_eq!(standings[1].last_ten, "1-1");
        assert_eq!(standings[1].streak, "W1");

        assert_eq!(standings[2].team, "Heat");
        assert_eq!(standings[2].streak, "L2");
    }

    #[test]
    fn test_differential_breaks_ties() {
        let games = vec![
            game(1, 1, (1, "Celtics", 101), (2, "Knicks", 100)),
            game(2, 2, (3, "Heat", 130), (4, "Bulls", 100)),
        ];
        let standings = compute_standings(&games);
        assert_eq!(standings[0].team, "Heat");
        assert_eq!(standings[1].team, "Celtics");
    }

    #[test]
    fn test_incomplete_games_are_ignored() {
        let mut pending = game(1, 1, (1, "Celtics", 0), (2, "Knicks", 0));
        pending.status = "scheduled".into();
        pending.home_score = None;
        pending.away_score = None;
        assert!(compute_standings(&[pending]).is_empty());
    }

    #[test]
    fn test_tie_counts_half() {
        let games = vec![game(1, 1, (1, "Red Bulls", 1), (2, "Union", 1))];
        let standings = compute_standings(&games);
        assert_eq!(standings[0].ties, 1);
        assert_eq!(standings[0].win_pct, 0.5);
        assert_eq!(standings[0].streak, "T1");
    }
}

//! Team form, head-to-head history and per-game feature vectors built from
//! completed games.

use serde::Serialize;

use crate::db::GameRecord;
use crate::models::Sport;

pub const FORM_GAMES_BACK: usize = 10;
pub const RECENT_FORM_GAMES: usize = 5;
pub const H2H_GAMES_BACK: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamForm {
    pub games_played: usize,
    pub avg_scored: f64,
    pub avg_allowed: f64,
    pub avg_differential: f64,
    pub win_pct: f64,
    pub home_win_pct: f64,
    pub away_win_pct: f64,
    /// Win share over the last five games.
    pub recent_form: f64,
    /// 1 / (stddev of points scored + 1).
    pub consistency: f64,
}

impl TeamForm {
    /// Form assumed for a team with no completed games.
    pub fn neutral(sport: Sport) -> Self {
        let half = sport.typical_total() / 2.0;
        Self {
            games_played: 0,
            avg_scored: half,
            avg_allowed: half,
            avg_differential: 0.0,
            win_pct: 0.5,
            home_win_pct: 0.5,
            away_win_pct: 0.5,
            recent_form: 0.5,
            consistency: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadToHead {
    pub games: usize,
    /// Share of meetings won by the first team.
    pub win_pct: f64,
    pub avg_total: f64,
    /// Average margin from the first team's side.
    pub avg_margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameFeatures {
    pub home: TeamForm,
    pub away: TeamForm,
    pub head_to_head: HeadToHead,
    pub point_diff_advantage: f64,
    pub win_pct_advantage: f64,
    pub home_court_advantage: f64,
    pub form_advantage: f64,
    pub projected_home_score: f64,
    pub projected_away_score: f64,
    pub projected_total: f64,
    /// Projected home margin; positive favours the home team.
    pub projected_spread: f64,
}

struct TeamGame {
    scored: f64,
    allowed: f64,
    at_home: bool,
}

impl TeamGame {
    fn won(&self) -> bool {
        self.scored > self.allowed
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

fn win_share<'a>(games: impl Iterator<Item = &'a TeamGame>) -> Option<f64> {
    mean(games.map(|g| if g.won() { 1.0 } else { 0.0 }))
}

/// Most recent completed games for `team_id`, newest first.
fn recent_games(team_id: i64, games: &[GameRecord], limit: usize) -> Vec<TeamGame> {
    let mut involved: Vec<&GameRecord> = games
        .iter()
        .filter(|g| g.home_team_id == Some(team_id) || g.away_team_id == Some(team_id))
        .filter(|g| g.final_score().is_some())
        .collect();
    involved.sort_by(|a, b| (b.game_date, b.id).cmp(&(a.game_date, a.id)));

    involved
        .into_iter()
        .take(limit)
        .filter_map(|g| {
            let (home, away) = g.final_score()?;
            let at_home = g.home_team_id == Some(team_id);
            let (scored, allowed) = if at_home { (home, away) } else { (away, home) };
            Some(TeamGame {
                scored: f64::from(scored),
                allowed: f64::from(allowed),
                at_home,
            })
        })
        .collect()
}

pub fn team_form(sport: Sport, team_id: i64, games: &[GameRecord], games_back: usize) -> TeamForm {
    let recent = recent_games(team_id, games, games_back);
    if recent.is_empty() {
        return TeamForm::neutral(sport);
    }

    let avg_scored = mean(recent.iter().map(|g| g.scored)).unwrap_or_default();
    let avg_allowed = mean(recent.iter().map(|g| g.allowed)).unwrap_or_default();
    let variance = mean(recent.iter().map(|g| (g.scored - avg_scored).powi(2))).unwrap_or_default();

    TeamForm {
        games_played: recent.len(),
        avg_scored,
        avg_allowed,
        avg_differential: avg_scored - avg_allowed,
        win_pct: win_share(recent.iter()).unwrap_or(0.5),
        home_win_pct: win_share(recent.iter().filter(|g| g.at_home)).unwrap_or(0.5),
        away_win_pct: win_share(recent.iter().filter(|g| !g.at_home)).unwrap_or(0.5),
        recent_form: win_share(recent.iter().take(RECENT_FORM_GAMES)).unwrap_or(0.5),
        consistency: 1.0 / (variance.sqrt() + 1.0),
    }
}

pub fn head_to_head(
    sport: Sport,
    team_a: i64,
    team_b: i64,
    games: &[GameRecord],
    games_back: usize,
) -> HeadToHead {
    let mut meetings: Vec<&GameRecord> = games
        .iter()
        .filter(|g| {
            (g.home_team_id == Some(team_a) && g.away_team_id == Some(team_b))
                || (g.home_team_id == Some(team_b) && g.away_team_id == Some(team_a))
        })
        .filter(|g| g.final_score().is_some())
        .collect();
    meetings.sort_by(|a, b| (b.game_date, b.id).cmp(&(a.game_date, a.id)));
    meetings.truncate(games_back);

    let margins: Vec<(f64, f64)> = meetings
        .iter()
        .filter_map(|g| {
            let (home, away) = g.final_score()?;
            let margin = if g.home_team_id == Some(team_a) {
                home - away
            } else {
                away - home
            };
            Some((f64::from(margin), f64::from(home + away)))
        })
        .collect();

    if margins.is_empty() {
        return HeadToHead {
            games: 0,
            win_pct: 0.5,
            avg_total: sport.typical_total(),
            avg_margin: 0.0,
        };
    }

    HeadToHead {
        games: margins.len(),
        win_pct: mean(margins.iter().map(|(m, _)| if *m > 0.0 { 1.0 } else { 0.0 })).unwrap_or(0.5),
        avg_total: mean(margins.iter().map(|(_, t)| *t)).unwrap_or(sport.typical_total()),
        avg_margin: mean(margins.iter().map(|(m, _)| *m)).unwrap_or_default(),
    }
}

pub fn game_features(sport: Sport, home_id: i64, away_id: i64, games: &[GameRecord]) -> GameFeatures {
    let home = team_form(sport, home_id, games, FORM_GAMES_BACK);
    let away = team_form(sport, away_id, games, FORM_GAMES_BACK);
    let head_to_head = head_to_head(sport, home_id, away_id, games, H2H_GAMES_BACK);

    let projected_home_score = (home.avg_scored + away.avg_allowed) / 2.0;
    let projected_away_score = (away.avg_scored + home.avg_allowed) / 2.0;

    GameFeatures {
        point_diff_advantage: home.avg_differential - away.avg_differential,
        win_pct_advantage: home.win_pct - away.win_pct,
        home_court_advantage: home.home_win_pct - away.away_win_pct,
        form_advantage: home.recent_form - away.recent_form,
        projected_home_score,
        projected_away_score,
        projected_total: projected_home_score + projected_away_score,
        projected_spread: projected_home_score - projected_away_score,
        home,
        away,
        head_to_head,
    }
}

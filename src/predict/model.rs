//! Baseline game model.
//!
//! Turns a feature vector into a win probability, a spread and a total
//! without any training step.

use serde::Serialize;

use crate::db::NewPrediction;
use crate::models::Sport;
use crate::predict::features::GameFeatures;

pub const BASELINE_MODEL_NAME: &str = "baseline_v1";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Confidence {
    pub outcome: f64,
    pub spread: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GamePrediction {
    pub model_name: String,
    pub home_win_probability: f64,
    /// Home margin; positive favours the home team.
    pub predicted_spread: f64,
    pub predicted_total: f64,
    pub confidence: Confidence,
}

impl GamePrediction {
    /// One row per prediction type, ready for the predictions table.
    pub fn to_rows(&self, game_id: i64) -> [NewPrediction; 3] {
        let row = |prediction_type: &str, predicted_value: f64, confidence: f64| NewPrediction {
            game_id,
            model_name: self.model_name.clone(),
            prediction_type: prediction_type.to_string(),
            predicted_value,
            confidence,
        };
        [
            row("winner", self.home_win_probability, self.confidence.outcome),
            row("spread", self.predicted_spread, self.confidence.spread),
            row("total", self.predicted_total, self.confidence.total),
        ]
    }
}

/// Points of home advantage and the margin that maps to ~73% win probability.
fn sport_constants(sport: Sport) -> (f64, f64) {
    match sport {
        Sport::Basketball => (2.5, 11.0),
        Sport::Football => (2.0, 13.0),
        Sport::Baseball => (0.2, 3.0),
        Sport::Hockey => (0.2, 2.0),
        Sport::Soccer => (0.3, 1.2),
    }
}

#[derive(Debug, Clone, Default)]
pub struct BaselineModel;

impl BaselineModel {
    pub fn name(&self) -> &'static str {
        BASELINE_MODEL_NAME
    }

    pub fn predict(&self, sport: Sport, features: &GameFeatures) -> GamePrediction {
        let (home_edge, margin_scale) = sport_constants(sport);

        let predicted_spread = features.projected_spread + home_edge;
        let home_win_probability = logistic(predicted_spread / margin_scale);

        // Lean on recent meetings a little once there are any.
        let h2h = &features.head_to_head;
        let predicted_total = if h2h.games > 0 {
            0.8 * features.projected_total + 0.2 * h2h.avg_total
        } else {
            features.projected_total
        };

        GamePrediction {
            model_name: BASELINE_MODEL_NAME.to_string(),
            home_win_probability,
            predicted_spread,
            predicted_total,
            confidence: Confidence {
                outcome: outcome_confidence(home_win_probability),
                spread: spread_confidence(predicted_spread),
                total: total_confidence(sport, predicted_total),
            },
        }
    }
}

pub(crate) fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn outcome_confidence(probability: f64) -> f64 {
    (probability - 0.5).abs() * 2.0
}

pub fn spread_confidence(spread: f64) -> f64 {
    (spread.abs() / 20.0).min(0.8)
}

/// Totals near the sport's typical score are the most trustworthy. For
/// basketball this is `1 - |total - 220| / 100`, clamped to 0.1..=0.8.
pub fn total_confidence(sport: Sport, total: f64) -> f64 {
    let typical = sport.typical_total();
    let tolerance = typical * 100.0 / 220.0;
    (1.0 - (total - typical).abs() / tolerance).clamp(0.1, 0.8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::features::{game_features, TeamForm};

    fn neutral_features() -> GameFeatures {
        game_features(Sport::Basketball, 1, 2, &[])
    }

    #[test]
    fn test_neutral_game_favours_home_slightly() {
        let prediction = BaselineModel.predict(Sport::Basketball, &neutral_features());
        assert_eq!(prediction.predicted_spread, 2.5);
        assert!(prediction.home_win_probability > 0.5);
        assert!(prediction.home_win_probability < 0.6);
        assert_eq!(prediction.predicted_total, 220.0);
        assert_eq!(prediction.confidence.total, 0.8);
    }

    #[test]
    fn test_stronger_home_team_is_favoured() {
        let mut features = neutral_features();
        features.home = TeamForm {
            avg_scored: 125.0,
            avg_allowed: 100.0,
            ..TeamForm::neutral(Sport::Basketball)
        };
        features.projected_home_score = (125.0 + features.away.avg_allowed) / 2.0;
        features.projected_away_score = (features.away.avg_scored + 100.0) / 2.0;
        features.projected_spread = features.projected_home_score - features.projected_away_score;

        let prediction = BaselineModel.predict(Sport::Basketball, &features);
        assert!(prediction.home_win_probability > 0.75);
        assert_eq!(prediction.confidence.spread, 0.75);
    }

    #[test]
    fn test_confidence_formulas() {
        assert_eq!(outcome_confidence(0.5), 0.0);
        assert_eq!(outcome_confidence(0.75), 0.5);
        assert_eq!(spread_confidence(-4.0), 0.2);
        assert_eq!(spread_confidence(30.0), 0.8);
        assert!((total_confidence(Sport::Basketball, 250.0) - 0.7).abs() < 1e-9);
        assert_eq!(total_confidence(Sport::Basketball, 400.0), 0.1);
    }

    #[test]
    fn test_rows_cover_each_prediction_type() {
        let prediction = BaselineModel.predict(Sport::Basketball, &neutral_features());
        let rows = prediction.to_rows(42);
        let types: Vec<&str> = rows.iter().map(|r| r.prediction_type.as_str()).collect();
        assert_eq!(types, ["winner", "spread", "total"]);
        assert!(rows.iter().all(|r| r.game_id == 42 && r.model_name == BASELINE_MODEL_NAME));
        assert_eq!(rows[1].predicted_value, prediction.predicted_spread);
    }
}

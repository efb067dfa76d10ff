//! Trained game models.
//!
//! Each completed game becomes one training example: the features the game
//! would have had on its morning (built only from earlier games) paired with
//! what actually happened. Per sport, a logistic regression learns the home
//! win, and two ridge regressions learn the home margin and the total.
//! Fitted parameters are persisted as JSON so prediction never refits.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use linfa::traits::Fit;
use linfa::Dataset;
use linfa_elasticnet::ElasticNet;
use linfa_logistic::LogisticRegression;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::GameRecord;
use crate::models::Sport;
use crate::predict::features::{game_features, GameFeatures};
use crate::predict::model::{
    logistic, outcome_confidence, spread_confidence, total_confidence, Confidence, GamePrediction,
};

pub const TRAINED_MODEL_NAME: &str = "trained_v1";

/// A team needs this many earlier games before its matchups are used.
pub const MIN_PRIOR_GAMES: usize = 3;

const LOGISTIC_ALPHA: f64 = 1.0;
const LOGISTIC_MAX_ITERATIONS: u64 = 200;
const RIDGE_PENALTY: f64 = 0.1;

pub const FEATURE_NAMES: [&str; 10] = [
    "point_diff_advantage",
    "win_pct_advantage",
    "home_court_advantage",
    "form_advantage",
    "h2h_win_pct",
    "h2h_avg_margin",
    "h2h_avg_total",
    "projected_total",
    "home_consistency",
    "away_consistency",
];

pub fn feature_vector(features: &GameFeatures) -> [f64; FEATURE_NAMES.len()] {
    [
        features.point_diff_advantage,
        features.win_pct_advantage,
        features.home_court_advantage,
        features.form_advantage,
        features.head_to_head.win_pct,
        features.head_to_head.avg_margin,
        features.head_to_head.avg_total,
        features.projected_total,
        features.home.consistency,
        features.away.consistency,
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingExample {
    pub game_id: i64,
    pub game_date: NaiveDate,
    pub features: [f64; FEATURE_NAMES.len()],
    pub home_win: bool,
    /// Home score minus away score.
    pub margin: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSet {
    pub sport: Sport,
    pub examples: Vec<TrainingExample>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// Pair every completed game with the features it had before tip-off.
///
/// History for a game is every completed game on an earlier date, so no
/// example sees its own result or anything after it. Games where either
/// team has fewer than [`MIN_PRIOR_GAMES`] earlier games are skipped.
pub fn prepare_training_data(sport: Sport, games: &[GameRecord]) -> TrainingSet {
    let mut ordered: Vec<GameRecord> = games
        .iter()
        .filter(|g| g.final_score().is_some())
        .cloned()
        .collect();
    ordered.sort_by(|a, b| (a.game_date, a.id).cmp(&(b.game_date, b.id)));

    let mut examples = Vec::new();
    for game in &ordered {
        let (Some(home_id), Some(away_id)) = (game.home_team_id, game.away_team_id) else {
            continue;
        };
        let Some((home_score, away_score)) = game.final_score() else {
            continue;
        };

        let cutoff = ordered.partition_point(|g| g.game_date < game.game_date);
        let history = &ordered[..cutoff];
        let features = game_features(sport, home_id, away_id, history);
        if features.home.games_played < MIN_PRIOR_GAMES
            || features.away.games_played < MIN_PRIOR_GAMES
        {
            continue;
        }

        examples.push(TrainingExample {
            game_id: game.id,
            game_date: game.game_date,
            features: feature_vector(&features),
            home_win: home_score > away_score,
            margin: f64::from(home_score - away_score),
            total: f64::from(home_score + away_score),
        });
    }

    debug!(%sport, games = ordered.len(), examples = examples.len(), "Training data prepared");
    TrainingSet { sport, examples }
}

/// Per-feature standardization learned from the training records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl FeatureScaler {
    fn fit(records: &Array2<f64>) -> Result<Self> {
        let mean = records
            .mean_axis(Axis(0))
            .context("Cannot scale an empty training set")?;
        let scale = records
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Ok(Self {
            mean: mean.to_vec(),
            scale: scale.to_vec(),
        })
    }

    fn transform(&self, records: &Array2<f64>) -> Array2<f64> {
        let mean = Array1::from(self.mean.clone());
        let scale = Array1::from(self.scale.clone());
        (records - &mean) / &scale
    }

    fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((x, mean), scale)| (x - mean) / scale)
            .collect()
    }
}

/// Weights over scaled features plus an intercept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LinearParams {
    fn apply(&self, scaled: &[f64]) -> f64 {
        self.intercept
            + self
                .weights
                .iter()
                .zip(scaled)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

/// In-sample fit quality, reported after training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    pub outcome_accuracy: f64,
    pub margin_mae: f64,
    pub total_mae: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SportModel {
    pub sport: Sport,
    pub trained_at: DateTime<Utc>,
    pub examples: usize,
    pub scaler: FeatureScaler,
    /// Log-odds of a home win.
    pub outcome: LinearParams,
    pub margin: LinearParams,
    pub total: LinearParams,
    pub metrics: FitMetrics,
}

impl SportModel {
    pub fn fit(set: &TrainingSet) -> Result<Self> {
        if set.len() < 2 {
            bail!("{} has only {} training examples", set.sport, set.len());
        }
        let home_wins = set.examples.iter().filter(|e| e.home_win).count();
        if home_wins == 0 || home_wins == set.len() {
            bail!("{} training outcomes are all one class", set.sport);
        }

        let flat: Vec<f64> = set.examples.iter().flat_map(|e| e.features).collect();
        let records = Array2::from_shape_vec((set.len(), FEATURE_NAMES.len()), flat)
            .context("Failed to shape training records")?;
        let scaler = FeatureScaler::fit(&records)?;
        let scaled = scaler.transform(&records);

        let outcomes: Array1<bool> = set.examples.iter().map(|e| e.home_win).collect();
        let fitted = LogisticRegression::<f64>::default()
            .alpha(LOGISTIC_ALPHA)
            .max_iterations(LOGISTIC_MAX_ITERATIONS)
            .fit(&Dataset::new(scaled.clone(), outcomes))
            .map_err(|e| anyhow!("Outcome model failed to fit: {e}"))?;
        // Orient the log-odds towards a home win whichever label linfa
        // picked as the positive class.
        let sign = if fitted.labels().pos.class { 1.0 } else { -1.0 };
        let outcome = LinearParams {
            weights: fitted.params().iter().map(|w| w * sign).collect(),
            intercept: fitted.intercept() * sign,
        };

        let margin = fit_ridge(&scaled, set.examples.iter().map(|e| e.margin).collect())
            .context("Margin model failed to fit")?;
        let total = fit_ridge(&scaled, set.examples.iter().map(|e| e.total).collect())
            .context("Total model failed to fit")?;

        let mut model = Self {
            sport: set.sport,
            trained_at: Utc::now(),
            examples: set.len(),
            scaler,
            outcome,
            margin,
            total,
            metrics: FitMetrics {
                outcome_accuracy: 0.0,
                margin_mae: 0.0,
                total_mae: 0.0,
            },
        };
        model.metrics = model.evaluate(set);

        info!(
            sport = %set.sport,
            examples = set.len(),
            outcome_accuracy = model.metrics.outcome_accuracy,
            margin_mae = model.metrics.margin_mae,
            total_mae = model.metrics.total_mae,
            "Sport model trained"
        );
        Ok(model)
    }

    fn raw_predict(&self, features: &[f64]) -> (f64, f64, f64) {
        let scaled = self.scaler.transform_row(features);
        let probability = logistic(self.outcome.apply(&scaled)).clamp(0.01, 0.99);
        let spread = self.margin.apply(&scaled);
        let total = self.total.apply(&scaled).max(0.0);
        (probability, spread, total)
    }

    fn evaluate(&self, set: &TrainingSet) -> FitMetrics {
        let n = set.len().max(1) as f64;
        let (mut correct, mut margin_error, mut total_error) = (0usize, 0.0, 0.0);
        for example in &set.examples {
            let (probability, spread, total) = self.raw_predict(&example.features);
            if (probability > 0.5) == example.home_win {
                correct += 1;
            }
            margin_error += (spread - example.margin).abs();
            total_error += (total - example.total).abs();
        }
        FitMetrics {
            outcome_accuracy: correct as f64 / n,
            margin_mae: margin_error / n,
            total_mae: total_error / n,
        }
    }

    pub fn predict(&self, features: &GameFeatures) -> GamePrediction {
        let (home_win_probability, predicted_spread, predicted_total) =
            self.raw_predict(&feature_vector(features));
        GamePrediction {
            model_name: TRAINED_MODEL_NAME.to_string(),
            home_win_probability,
            predicted_spread,
            predicted_total,
            confidence: Confidence {
                outcome: outcome_confidence(home_win_probability),
                spread: spread_confidence(predicted_spread),
                total: total_confidence(self.sport, predicted_total),
            },
        }
    }
}

fn fit_ridge(scaled: &Array2<f64>, targets: Array1<f64>) -> Result<LinearParams> {
    let fitted = ElasticNet::<f64>::params()
        .penalty(RIDGE_PENALTY)
        .l1_ratio(0.0)
        .fit(&Dataset::new(scaled.clone(), targets))
        .map_err(|e| anyhow!("{e}"))?;
    Ok(LinearParams {
        weights: fitted.hyperplane().to_vec(),
        intercept: fitted.intercept(),
    })
}

/// Every trained sport, as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub name: String,
    pub features: Vec<String>,
    pub sports: Vec<SportModel>,
}

impl Default for TrainedModel {
    fn default() -> Self {
        Self {
            name: TRAINED_MODEL_NAME.to_string(),
            features: FEATURE_NAMES.iter().map(|f| (*f).to_string()).collect(),
            sports: Vec::new(),
        }
    }
}

impl TrainedModel {
    pub fn insert(&mut self, model: SportModel) {
        self.sports.retain(|m| m.sport != model.sport);
        self.sports.push(model);
        self.sports.sort_by_key(|m| m.sport.as_str());
    }

    pub fn sport(&self, sport: Sport) -> Option<&SportModel> {
        self.sports.iter().find(|m| m.sport == sport)
    }

    pub fn is_empty(&self) -> bool {
        self.sports.is_empty()
    }

    /// `None` when this sport was never trained.
    pub fn predict(&self, sport: Sport, features: &GameFeatures) -> Option<GamePrediction> {
        self.sport(sport).map(|m| m.predict(features))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize model")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write model file: {}", path.display()))?;
        info!(path = %path.display(), sports = self.sports.len(), "Trained model saved");
        Ok(())
    }

    /// Load a saved model. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file: {}", path.display()))?;
        let model: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if model.features != FEATURE_NAMES {
            bail!(
                "{} was trained on features {:?}, expected {:?}",
                path.display(),
                model.features,
                FEATURE_NAMES
            );
        }
        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    const STRENGTH: [i32; 6] = [12, 6, 2, -2, -6, -12];

    fn final_game(id: i64, date: NaiveDate, home: i64, away: i64, hs: i32, aws: i32) -> GameRecord {
        GameRecord {
            id,
            external_id: None,
            league: "nba".into(),
            sport: "basketball".into(),
            home_team_id: Some(home),
            away_team_id: Some(away),
            home_team: None,
            away_team: None,
            game_date: date,
            start_time: None,
            season: "2024-25".into(),
            status: "completed".into(),
            home_score: Some(hs),
            away_score: Some(aws),
        }
    }

    /// Six teams of fixed strength in a rotating round robin, three games a
    /// day. Home and away swap every five days.
    fn season(days: u64) -> Vec<GameRecord> {
        let opening = NaiveDate::from_ymd_opt(2024, 10, 22).unwrap();
        let mut games = Vec::new();
        let mut id = 0;
        for day in 0..days {
            let date = opening + Days::new(day);
            let round = (day % 5) as usize;
            let ring: Vec<usize> = (0..5).map(|i| 1 + (i + round) % 5).collect();
            let pairs = [(0, ring[0]), (ring[1], ring[4]), (ring[2], ring[3])];
            for (a, b) in pairs {
                id += 1;
                let (home, away) = if (day / 5) % 2 == 0 { (a, b) } else { (b, a) };
                let edge = STRENGTH[home] - STRENGTH[away];
                let noise = |salt: i64| ((id * 7919 + salt) % 13) as i32 - 6;
                let home_score = 108 + edge / 2 + 3 + noise(1);
                let away_score = 108 - edge / 2 + noise(5);
                games.push(final_game(
                    id,
                    date,
                    home as i64 + 1,
                    away as i64 + 1,
                    home_score,
                    away_score,
                ));
            }
        }
        games
    }

    #[test]
    fn test_training_data_only_sees_earlier_games() {
        let games = season(40);
        let set = prepare_training_data(Sport::Basketball, &games);

        assert!(!set.is_empty());
        assert!(set.len() < games.len(), "early-season games lack history");
        let first = &set.examples[0];
        assert!(first.game_date > games[0].game_date);

        let source = games.iter().find(|g| g.id == first.game_id).unwrap();
        let (hs, aws) = source.final_score().unwrap();
        assert_eq!(first.margin, f64::from(hs - aws));
        assert_eq!(first.total, f64::from(hs + aws));
        assert_eq!(first.home_win, hs > aws);

        // Same-day results never leak into a game's own features.
        let history: Vec<GameRecord> = games
            .iter()
            .filter(|g| g.game_date < first.game_date)
            .cloned()
            .collect();
        let expected = game_features(
            Sport::Basketball,
            source.home_team_id.unwrap(),
            source.away_team_id.unwrap(),
            &history,
        );
        assert_eq!(first.features, feature_vector(&expected));
    }

    #[test]
    fn test_unscored_games_are_ignored() {
        let mut games = season(10);
        for game in &mut games {
            game.home_score = None;
        }
        assert!(prepare_training_data(Sport::Basketball, &games).is_empty());
    }

    #[test]
    fn test_fit_rejects_single_class() {
        let mut set = prepare_training_data(Sport::Basketball, &season(30));
        for example in &mut set.examples {
            example.home_win = true;
        }
        let err = SportModel::fit(&set).unwrap_err();
        assert!(err.to_string().contains("one class"));
    }

    #[test]
    fn test_trained_model_learns_team_strength() {
        let games = season(60);
        let set = prepare_training_data(Sport::Basketball, &games);
        let model = SportModel::fit(&set).unwrap();

        assert_eq!(model.examples, set.len());
        assert!(model.metrics.outcome_accuracy > 0.6, "{:?}", model.metrics);

        let strong_home = model.predict(&game_features(Sport::Basketball, 1, 6, &games));
        assert_eq!(strong_home.model_name, TRAINED_MODEL_NAME);
        assert!(strong_home.home_win_probability > 0.5);
        assert!(strong_home.predicted_spread > 0.0);
        assert!(strong_home.predicted_total > 150.0 && strong_home.predicted_total < 300.0);

        let weak_home = model.predict(&game_features(Sport::Basketball, 6, 1, &games));
        assert!(weak_home.home_win_probability < strong_home.home_win_probability);
        assert!(weak_home.predicted_spread < strong_home.predicted_spread);
    }

    #[test]
    fn test_saved_model_loads_back() {
        let games = season(45);
        let mut trained = TrainedModel::default();
        trained.insert(SportModel::fit(&prepare_training_data(Sport::Basketball, &games)).unwrap());

        let path = std::env::temp_dir()
            .join(format!("apex-model-{}", uuid::Uuid::new_v4()))
            .join("trained.json");
        trained.save(&path).unwrap();
        let loaded = TrainedModel::load(&path).unwrap().unwrap();
        std::fs::remove_dir_all(path.parent().unwrap()).ok();

        let features = game_features(Sport::Basketball, 2, 5, &games);
        assert_eq!(
            loaded.predict(Sport::Basketball, &features),
            trained.predict(Sport::Basketball, &features)
        );
        assert!(loaded.predict(Sport::Hockey, &features).is_none());
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let path = std::env::temp_dir().join(format!("apex-missing-{}.json", uuid::Uuid::new_v4()));
        assert!(TrainedModel::load(&path).unwrap().is_none());
    }

    #[test]
    fn test_load_rejects_other_feature_set() {
        let mut trained = TrainedModel::default();
        trained.features.pop();
        let path = std::env::temp_dir().join(format!("apex-stale-{}.json", uuid::Uuid::new_v4()));
        trained.save(&path).unwrap();
        let err = TrainedModel::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(err.to_string().contains("trained on features"));
    }
}

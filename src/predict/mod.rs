pub mod features;
pub mod model;
pub mod service;
pub mod training;

pub use features::{game_features, head_to_head, team_form, GameFeatures, HeadToHead, TeamForm};
pub use model::{BaselineModel, Confidence, GamePrediction};
pub use service::{PredictionReport, PredictionService, SportTraining, TrainingReport};
pub use training::{prepare_training_data, SportModel, TrainedModel, TrainingSet};

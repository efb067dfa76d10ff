pub mod store;

pub use store::{
    GameFilter, GameRecord, GradeReport, IntegrityReport, NewPrediction, NewScrapeLog,
    OddsRecord, PredictionRecord, ScrapeLogRecord, Store, TeamRecord,
};

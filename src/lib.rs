//! Sports statistics backend: provider sync with fallback, a Postgres store,
//! standings, baseline predictions and a JSON API.

pub mod clean;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod monitoring;
pub mod predict;
pub mod providers;
pub mod resilience;
pub mod server;
pub mod stats;
pub mod sync;

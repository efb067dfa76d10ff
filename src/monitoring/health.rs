//! Process health shared by the scheduler, the sync endpoint and `/api/health`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::{DataType, Sport};

/// Shared health state updated after every sync.
#[derive(Clone)]
pub struct HealthState {
    inner: Arc<RwLock<HealthData>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastSync {
    pub sport: Sport,
    pub data_type: DataType,
    pub source: String,
    pub rows_written: u64,
    pub degraded: bool,
    pub success: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub syncs_completed: u64,
    pub syncs_failed: u64,
    pub last_sync: Option<LastSync>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HealthData {
                status: "ok".to_string(),
                version: env!("CARGO_PKG_VERSION"),
                started_at: Utc::now(),
                uptime_seconds: 0,
                syncs_completed: 0,
                syncs_failed: 0,
                last_sync: None,
                last_success_at: None,
            })),
        }
    }

    pub async fn record_sync(&self, sync: LastSync) {
        let mut data = self.inner.write().await;
        if sync.success {
            data.syncs_completed += 1;
            data.last_success_at = Some(sync.at);
        } else {
            data.syncs_failed += 1;
        }
        data.status = if sync.success && !sync.degraded {
            "ok".to_string()
        } else {
            "degraded".to_string()
        };
        data.last_sync = Some(sync);
    }

    pub async fn snapshot(&self) -> HealthData {
        let mut data = self.inner.read().await.clone();
        data.uptime_seconds = (Utc::now() - data.started_at).num_seconds();
        data
    }
}

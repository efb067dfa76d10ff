//! External sports-data providers.
//!
//! Each provider adapts one third-party API to [`CanonicalRows`]. The
//! [`fallback::FallbackChain`] decides which provider to ask and what to
//! serve when they all fail.

pub mod espn;
pub mod fallback;
pub mod odds_api;
pub mod static_data;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CanonicalRows, DataType, Sport};

pub use espn::EspnProvider;
pub use fallback::{FallbackChain, FetchOrigin, FetchOutcome};
pub use odds_api::OddsApiProvider;
pub use static_data::StaticProvider;

/// Why a provider fetch failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("failed to parse provider response: {0}")]
    Parse(String),

    #[error("{provider} does not serve {data_type} for {sport}")]
    Unsupported {
        provider: String,
        sport: Sport,
        data_type: DataType,
    },

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Transient failures worth retrying against the same provider.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited => true,
            Self::Status(code) => *code >= 500,
            _ => false,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::RateLimited => "rate_limited",
            Self::Status(_) => "status",
            Self::Parse(_) => "parse",
            Self::Unsupported { .. } => "unsupported",
            Self::CircuitOpen(_) => "circuit_open",
            Self::NotConfigured(_) => "not_configured",
        }
    }

    /// Whether the failure says something about the provider's health.
    /// Unsupported requests and missing credentials do not count against a breaker.
    pub fn counts_against_breaker(&self) -> bool {
        !matches!(
            self,
            Self::Unsupported { .. } | Self::CircuitOpen(_) | Self::NotConfigured(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl ProviderError {
    pub fn from_status(code: u16) -> Self {
        if code == 429 {
            Self::RateLimited
        } else {
            Self::Status(code)
        }
    }
}

/// Adapter from one external API to canonical rows.
#[async_trait]
pub trait SportsProvider: Send + Sync {
    /// Stable name, used for breaker keys, logs and scrape logs.
    fn name(&self) -> &str;

    fn supports(&self, sport: Sport, data_type: DataType) -> bool;

    async fn fetch(&self, sport: Sport, data_type: DataType)
        -> Result<CanonicalRows, ProviderError>;
}

/// Send a GET request and decode the JSON body, classifying failures.
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::from_status(status.as_u16()));
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ProviderError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_categories() {
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(ProviderError::RateLimited.is_retryable());
        assert!(ProviderError::Status(502).is_retryable());
        assert!(!ProviderError::Status(404).is_retryable());
        assert!(!ProviderError::Parse("bad".into()).is_retryable());
    }

    #[test]
    fn test_429_maps_to_rate_limited() {
        assert_eq!(ProviderError::from_status(429), ProviderError::RateLimited);
        assert_eq!(ProviderError::from_status(500), ProviderError::Status(500));
    }

    #[test]
    fn test_unsupported_does_not_count_against_breaker() {
        let err = ProviderError::Unsupported {
            provider: "espn".into(),
            sport: Sport::Soccer,
            data_type: DataType::Odds,
        };
        assert!(!err.counts_against_breaker());
        assert!(ProviderError::Status(500).counts_against_breaker());
    }
}

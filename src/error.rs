use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the HTTP API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("upstream provider error: {0}")]
    Upstream(String),

    /// Every provider failed and nothing usable was cached.
    #[error("data unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Database(_) => "database_error",
            Self::Upstream(_) => "upstream_error",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn missing_param(name: &str) -> Self {
        Self::BadRequest(format!("missing required query parameter '{name}'"))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("record".to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Store methods wrap sqlx errors in anyhow context; keep them classified as database errors.
        if let Some(sqlx_err) = err.downcast_ref::<sqlx::Error>() {
            if matches!(sqlx_err, sqlx::Error::RowNotFound) {
                return Self::NotFound("record".to_string());
            }
            return Self::Database(format!("{err:#}"));
        }
        Self::Internal(format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::missing_param("sport").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("game".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Upstream("espn".into()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::Unavailable("odds".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_anyhow_wrapping_sqlx_is_database_error() {
        let result: anyhow::Result<()> =
            Err(sqlx::Error::PoolTimedOut).context("Failed to list teams");
        let api: ApiError = result.unwrap_err().into();
        assert!(matches!(api, ApiError::Database(_)));
        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_anyhow_row_not_found_is_404() {
        let result: anyhow::Result<()> = Err(sqlx::Error::RowNotFound).context("Failed to get game");
        let api: ApiError = result.unwrap_err().into();
        assert!(matches!(api, ApiError::NotFound(_)));
    }
}

//! Error types for the faucet service

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use drip_common::DripError;
use drip_core::FaucetError;
use serde_json::json;
use thiserror::Error;

/// HTTP-facing errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Faucet(#[from] FaucetError),

    #[error("Rate limit exceeded: try again in {0} seconds")]
    RateLimitExceeded(u64),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Faucet(e) => match e {
                FaucetError::Paused | FaucetError::SupplyCapExceeded => StatusCode::SERVICE_UNAVAILABLE,
                FaucetError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
                FaucetError::LifetimeCapReached => StatusCode::FORBIDDEN,
                FaucetError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
                FaucetError::ReentrantCall => StatusCode::CONFLICT,
                FaucetError::InvalidPolicy(_) | FaucetError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidAddress(_) | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Faucet(e) => e.code(),
            ApiError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            ApiError::InvalidAddress(_) => "INVALID_ADDRESS",
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Seconds until a retry can succeed, for throttling errors.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::Faucet(FaucetError::CooldownActive { remaining_secs }) => Some(*remaining_secs),
            ApiError::RateLimitExceeded(secs) => Some(*secs),
            _ => None,
        }
    }
}

impl From<DripError> for ApiError {
    fn from(err: DripError) -> Self {
        match err {
            DripError::Address(e) => ApiError::InvalidAddress(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after();

        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        if let Some(secs) = retry_after {
            body["retry_after_secs"] = json!(secs);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

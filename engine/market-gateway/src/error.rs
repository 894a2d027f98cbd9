//! Error responses and rejection recovery

use auction_engine::{ErrorKind, MarketError};
use market_scheduler::SchedulerError;
use serde::Serialize;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::Reply;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub timestamp: String,
}

/// Error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

/// Rejection carrying a ready-made error response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl warp::reject::Reject for ApiError {}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: ErrorDetail { code: code.to_string(), message: message.into(), details: None },
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        }
    }
}

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::Precondition => (StatusCode::CONFLICT, "PRECONDITION_FAILED"),
            ErrorKind::InsufficientFunds => (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS"),
            ErrorKind::Storage => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        };
        if status.is_server_error() {
            tracing::error!("Market request failed: {}", err);
        } else {
            tracing::debug!("Market request rejected: {}", err);
        }
        ApiError::new(status, code, err.to_string())
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        ApiError::from(err.into_market())
    }
}

/// Shorthand for handlers: converts any market error into a rejection
pub fn reject(err: impl Into<ApiError>) -> warp::Rejection {
    warp::reject::custom(err.into())
}

/// Turns every rejection into a JSON error body
pub async fn handle_rejection(err: warp::Rejection) -> Result<impl Reply, Infallible> {
    if let Some(api) = err.find::<ApiError>() {
        return Ok(warp::reply::with_status(warp::reply::json(&api.body), api.status));
    }

    let api_error = if err.is_not_found() {
        ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Route not found")
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
    } else if let Some(e) = err.find::<warp::reject::MissingHeader>() {
        ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
        ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED", "Method not allowed")
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal server error")
    };

    Ok(warp::reply::with_status(warp::reply::json(&api_error.body), api_error.status))
}

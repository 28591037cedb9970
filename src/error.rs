use axum::{
    Json,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::rate_limit::{Decision, RateLimitError, get_rate_limit_headers};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Too many requests, retry in {retry_after} seconds")]
    RateLimited { decision: Decision, retry_after: u64 },

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("No healthy backends available")]
    NoHealthyBackend,

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Rate limiter misconfigured: {0}")]
    Limiter(#[from] RateLimitError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Metrics encoding failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<u32>,
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::RateLimited { .. } => "rate_limited",
            AppError::UnknownResource(_) => "not_found",
            AppError::NoHealthyBackend => "service_unavailable",
            AppError::Upstream(_) => "bad_gateway",
            AppError::Limiter(_)
            | AppError::Config(_)
            | AppError::Metrics(_)
            | AppError::Io(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::UnknownResource(_) => StatusCode::NOT_FOUND,
            AppError::NoHealthyBackend => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Limiter(_)
            | AppError::Config(_)
            | AppError::Metrics(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let (retry_after, limit, remaining) = match &self {
            AppError::RateLimited {
                decision,
                retry_after,
            } => (Some(*retry_after), Some(decision.limit), Some(0)),
            _ => (None, None, None),
        };
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            retry_after,
            limit,
            remaining,
        };

        let mut response = (status, Json(body)).into_response();
        if let AppError::RateLimited {
            decision,
            retry_after,
        } = &self
        {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
            apply_rate_limit_headers(headers, decision);
        }
        response
    }
}

/// Copy the advisory rate limit headers for `decision` onto a response.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    for (name, value) in get_rate_limit_headers(decision) {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

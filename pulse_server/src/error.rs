use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use pulse_core::{Decision, FixedWindowLimiter, PulseError};
use serde_json::json;
use std::time::Duration;
use tracing::error;

/// HTTP-facing error taxonomy. Client-correctable problems carry their
/// message through; internal faults are logged server-side and masked.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    RateLimited {
        limit: u32,
        window: Duration,
        retry_after: Duration,
    },
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn rate_limited(limiter: &FixedWindowLimiter, decision: Decision) -> Self {
        ApiError::RateLimited {
            limit: limiter.limit(),
            window: limiter.window(),
            retry_after: decision.retry_after,
        }
    }
}

impl From<PulseError> for ApiError {
    fn from(err: PulseError) -> Self {
        match err {
            PulseError::Validation(message) => ApiError::BadRequest(message),
            PulseError::GatewayUnreachable { .. } => ApiError::ServiceUnavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
            }

            ApiError::RateLimited {
                limit,
                window,
                retry_after,
            } => {
                let detail = format!(
                    "Rate limit exceeded: {} per {}",
                    limit,
                    humantime::format_duration(window)
                );
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "detail": detail })),
                )
                    .into_response();

                let headers = response.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                    headers.insert(header::RETRY_AFTER, value);
                }
                if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
                    headers.insert("x-ratelimit-limit", value);
                }
                if let Ok(value) = HeaderValue::from_str(&format!("{}s", window.as_secs())) {
                    headers.insert("x-ratelimit-window", value);
                }
                response
            }

            ApiError::ServiceUnavailable(detail) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": detail })),
            )
                .into_response(),

            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

use crate::state::AppState;
use anyhow::{bail, Context};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use pulse_core::Settings;
use serde_json::json;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

const DEV_FALLBACK_ORIGINS: [&str; 3] = [
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:3000",
];

/// Builds the CORS layer from `ALLOWED_ORIGINS`.
///
/// Development falls back to localhost origins; production refuses to start
/// without an explicit list rather than serving wildcard origins.
pub fn cors_layer(settings: &Settings) -> anyhow::Result<CorsLayer> {
    let origins: Vec<String> = if !settings.allowed_origins.is_empty() {
        info!("CORS origins configured: {:?}", settings.allowed_origins);
        settings.allowed_origins.clone()
    } else if !settings.is_production() {
        warn!(
            "Development mode: using fallback CORS origins: {:?}",
            DEV_FALLBACK_ORIGINS
        );
        DEV_FALLBACK_ORIGINS.iter().map(|s| s.to_string()).collect()
    } else {
        bail!(
            "Production mode: ALLOWED_ORIGINS must be explicitly set. \
             Refusing to start with wildcard origins."
        );
    };

    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin: {}", origin))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-requested-with"),
        ])
        .max_age(Duration::from_secs(600)))
}

/// Rejects oversized bodies before routing: Content-Length beyond the
/// configured cap is 413, a malformed header is 400.
pub async fn request_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(raw) = request.headers().get(header::CONTENT_LENGTH) {
        let client = client_ip(&request);
        match raw.to_str().ok().and_then(|s| s.parse::<usize>().ok()) {
            Some(size) if size > state.settings.max_request_size => {
                warn!("Request too large from {}: {} bytes", client, size);
                return (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    Json(json!({ "detail": "Request body too large" })),
                )
                    .into_response();
            }
            Some(_) => {}
            None => {
                warn!("Invalid Content-Length from {}", client);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "detail": "Invalid request" })),
                )
                    .into_response();
            }
        }
    }

    next.run(request).await
}

/// Adds the response security headers and the processing-time header.
pub async fn security_headers(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "x-xss-protection",
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    if state.settings.is_production() {
        headers.insert(
            "strict-transport-security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{:.4}", start.elapsed().as_secs_f64())) {
        headers.insert("x-process-time", value);
    }

    response
}

fn client_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

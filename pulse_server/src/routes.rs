use crate::error::ApiError;
use crate::layers;
use crate::state::AppState;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use pulse_core::{ApplyRequest, OpClass};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tracing::{error, info, warn};

#[derive(Debug, Serialize)]
struct ApplyResponse {
    success: bool,
    message: String,
    metrics_count: usize,
    timestamp: i64,
    rate_limit_info: RateLimitInfo,
}

#[derive(Debug, Serialize)]
struct RateLimitInfo {
    limit: String,
    window: String,
    tip: &'static str,
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/status", get(api_status))
        .route("/metrics", get(metrics))
        .route("/api/metrics/apply", post(apply_metrics));

    if state.settings.debug {
        router = router.route("/debug/config", get(debug_config));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            layers::request_guard,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            layers::security_headers,
        ))
        .with_state(state)
}

async fn check_general(state: &AppState, addr: SocketAddr) -> Result<(), ApiError> {
    let decision = state.limiters.allow(addr.ip(), OpClass::General).await;
    if decision.allowed {
        Ok(())
    } else {
        warn!("Rate limited request from {}", addr.ip());
        Err(ApiError::rate_limited(&state.limiters.general, decision))
    }
}

async fn root(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<Value>, ApiError> {
    check_general(&state, addr).await?;

    Ok(Json(json!({
        "message": "Metrics Simulator API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "env": state.settings.environment,
        "apply_changes_limit": state.limiters.apply.describe(),
    })))
}

async fn health(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<Value>, ApiError> {
    check_general(&state, addr).await?;

    // Startup aborts if the backend cannot be constructed, so its presence
    // here is a given; the gateway probe is the live part of the check.
    let prometheus_healthy = state.backend.probe().await;

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().timestamp(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "backend_healthy": true,
        "prometheus_healthy": prometheus_healthy,
    })))
}

async fn api_status(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<Value>, ApiError> {
    check_general(&state, addr).await?;

    let status = state.backend.status().await;
    let mut body =
        serde_json::to_value(&status).map_err(|e| ApiError::Internal(e.to_string()))?;

    if let Some(object) = body.as_object_mut() {
        object.insert(
            "api_version".to_string(),
            json!(env!("CARGO_PKG_VERSION")),
        );
        object.insert("environment".to_string(), json!(state.settings.environment));
        object.insert(
            "rate_limits".to_string(),
            json!({
                "apply_changes": state.limiters.apply.describe(),
                "other_endpoints": state.limiters.general.describe(),
                "max_metrics_per_request": state.settings.max_metrics_per_request,
            }),
        );
        object.insert(
            "client_info".to_string(),
            json!({
                "ip": if state.settings.debug {
                    addr.ip().to_string()
                } else {
                    "hidden".to_string()
                },
            }),
        );
    }

    Ok(Json(body))
}

/// Exposition-format view of the internal registry (not the pushed one).
async fn metrics(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<impl IntoResponse, ApiError> {
    check_general(&state, addr).await?;

    let snapshot = state.backend.snapshot().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        snapshot,
    ))
}

async fn apply_metrics(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<ApplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let decision = state.limiters.allow(addr.ip(), OpClass::Apply).await;
    if !decision.allowed {
        warn!("Rate limited apply changes request from {}", addr.ip());
        return Err(ApiError::rate_limited(&state.limiters.apply, decision));
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("Unknown");
    info!(
        "Apply changes request from {}: {} metric(s), user-agent: {:.50}",
        addr.ip(),
        request.metrics.len(),
        user_agent
    );

    let samples = state
        .validator
        .validate(&request, pulse_core::validate::now_ms())
        .map_err(|e| {
            warn!("Apply changes validation error from {}: {}", addr.ip(), e);
            ApiError::from(e)
        })?;

    let message = state.backend.apply(&samples).await.map_err(|e| {
        error!("Apply changes failed from {}: {}", addr.ip(), e);
        ApiError::from(e)
    })?;

    info!(
        "Apply changes successful from {}: {} metric(s) applied",
        addr.ip(),
        samples.len()
    );

    let body = ApplyResponse {
        success: true,
        message,
        metrics_count: samples.len(),
        timestamp: Utc::now().timestamp(),
        rate_limit_info: RateLimitInfo {
            limit: state.limiters.apply.describe(),
            window: format!("{} seconds", state.limiters.apply.window().as_secs()),
            tip: "Wait at least 5 minutes between applies to avoid hitting the limit",
        },
    };

    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&state.limiters.apply.limit().to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) =
        HeaderValue::from_str(&format!("{}s", state.limiters.apply.window().as_secs()))
    {
        headers.insert("x-ratelimit-window", value);
    }
    Ok(response)
}

async fn debug_config(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<Value>, ApiError> {
    check_general(&state, addr).await?;

    Ok(Json(json!({
        "apply_changes_limit": state.limiters.apply.describe(),
        "general_limit": state.limiters.general.describe(),
        "client_ip": addr.ip().to_string(),
        "env": state.settings.environment,
        "debug": state.settings.debug,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use pulse_core::{MetricsBackend, Publisher, PulseError, Result as CoreResult, Settings};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    struct MockPublisher {
        pushes: Mutex<Vec<String>>,
        reachable: bool,
    }

    impl MockPublisher {
        fn new() -> Self {
            Self {
                pushes: Mutex::new(Vec::new()),
                reachable: true,
            }
        }

        fn unreachable() -> Self {
            Self {
                pushes: Mutex::new(Vec::new()),
                reachable: false,
            }
        }
    }

    #[async_trait]
    impl Publisher for MockPublisher {
        async fn push(&self, exposition: String) -> CoreResult<()> {
            if !self.reachable {
                return Err(PulseError::GatewayUnreachable {
                    url: "http://pushgateway:9091".to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            self.pushes.lock().await.push(exposition);
            Ok(())
        }

        async fn probe(&self) -> bool {
            self.reachable
        }

        fn endpoint(&self) -> &str {
            "http://pushgateway:9091"
        }

        fn job(&self) -> &str {
            "metrics_simulator"
        }
    }

    fn test_state(publisher: MockPublisher) -> AppState {
        let settings = Settings {
            environment: "development".to_string(),
            ..Settings::default()
        };
        AppState::new(settings, Arc::new(MetricsBackend::new(Arc::new(publisher))))
    }

    fn app(state: AppState) -> Router {
        router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4321))))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn apply_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/metrics/apply")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(test_state(MockPublisher::new()));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend_healthy"], true);
        assert_eq!(body["prometheus_healthy"], true);
    }

    #[tokio::test]
    async fn test_apply_then_snapshot() {
        let state = test_state(MockPublisher::new());
        let app = app(state);

        let response = app
            .clone()
            .oneshot(apply_request(
                r#"{"metrics": {"cpu_seconds_total": {"value": 1205.3, "unit": "s"}}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["metrics_count"], 1);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("cpu_seconds_total 1205.3"));
    }

    #[tokio::test]
    async fn test_apply_bad_name_rejected_without_mutation() {
        let state = test_state(MockPublisher::new());
        let app = app(state.clone());

        let response = app
            .clone()
            .oneshot(apply_request(
                r#"{"metrics": {"bad name!": {"value": 1}}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .contains("Invalid metric name format"));

        assert!(state.backend.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_apply_value_out_of_range_rejected() {
        let state = test_state(MockPublisher::new());
        let app = app(state.clone());

        let response = app
            .oneshot(apply_request(
                r#"{"metrics": {"metric_a": {"value": 1e16}}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.backend.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_fourth_apply_rate_limited() {
        let app = app(test_state(MockPublisher::new()));
        let body = r#"{"metrics": {"metric_a": {"value": 1}}}"#;

        for _ in 0..3 {
            let response = app.clone().oneshot(apply_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(apply_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        let body = body_json(response).await;
        assert!(body["detail"].as_str().unwrap().contains("Rate limit exceeded"));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_returns_503_but_keeps_state() {
        let state = test_state(MockPublisher::unreachable());
        let app = app(state.clone());

        let response = app
            .clone()
            .oneshot(apply_request(
                r#"{"metrics": {"cpu_seconds_total": {"value": 1205.3, "unit": "s"}}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .contains("Cannot connect to push gateway"));

        // The documented inconsistency: the push failed but the registry
        // already holds the value.
        let snapshot = state.backend.snapshot().await.unwrap();
        assert!(snapshot.contains("cpu_seconds_total 1205.3"));
    }

    #[tokio::test]
    async fn test_status_reports_limits() {
        let app = app(test_state(MockPublisher::new()));

        let response = app
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["rate_limits"]["apply_changes"], "3 per 15m");
        assert_eq!(body["rate_limits"]["max_metrics_per_request"], 50);
        assert_eq!(body["client_info"]["ip"], "hidden");
        assert_eq!(body["job_name"], "metrics_simulator");
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let app = app(test_state(MockPublisher::new()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/metrics/apply")
                    .header("content-type", "application/json")
                    .header("content-length", (2 * 1024 * 1024).to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_security_headers_present() {
        let app = app(test_state(MockPublisher::new()));

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert!(response.headers().contains_key("x-process-time"));
    }

    #[tokio::test]
    async fn test_debug_config_hidden_by_default() {
        let app = app(test_state(MockPublisher::new()));

        let response = app
            .oneshot(Request::get("/debug/config").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

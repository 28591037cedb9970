//! HTTP-level tests for the gateway.
//!
//! Each test drives the router with `oneshot` against a throwaway upstream
//! server bound to an ephemeral port, and a manual clock so window expiry is
//! deterministic.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, RawQuery},
    http::{HeaderMap, Request, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use roster_gateway::app;
use roster_gateway::clock::ManualClock;
use roster_gateway::load_balancer::LoadBalancer;
use roster_gateway::rate_limit::{Quota, RateLimiter};
use roster_gateway::state::AppState;

const START: i64 = 1_700_000_000_000;

async fn spawn_upstream() -> String {
    async fn list() -> Json<Value> {
        Json(json!([{ "id": "1", "name": "Officer Reyes" }]))
    }

    async fn show(Path(id): Path<String>, RawQuery(query): RawQuery) -> Json<Value> {
        Json(json!({ "id": id, "query": query }))
    }

    async fn create(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
        let cookie = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (
            StatusCode::CREATED,
            [(header::SET_COOKIE, "session=renewed; Path=/")],
            Json(json!({ "created": payload, "cookie": cookie })),
        )
    }

    let router = Router::new()
        .route("/api/personnel", get(list))
        .route("/api/personnel/{id}", get(show))
        .route("/api/assignments", axum::routing::post(create));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr.to_string()
}

fn gateway(backends: &str, quota: Quota, clock: &ManualClock) -> Router {
    let state = Arc::new(AppState {
        client: reqwest::Client::builder().no_proxy().build().unwrap(),
        load_balancer: Arc::new(LoadBalancer::new(backends).unwrap()),
        rate_limiter: Arc::new(RateLimiter::new(Arc::new(clock.clone()))),
        quota,
        trust_proxy: false,
    });
    app(state)
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_forwards_and_reports_quota() {
    let upstream = spawn_upstream().await;
    let clock = ManualClock::new(START);
    let app = gateway(&upstream, Quota::new(3, 1000).unwrap(), &clock);

    let response = app.oneshot(get_request("/api/personnel")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(response.headers(), "x-ratelimit-remaining"), "2");
    assert_eq!(
        header_str(response.headers(), "x-ratelimit-reset"),
        "2023-11-14T22:13:21.000Z"
    );
    let body = json_body(response).await;
    assert_eq!(body[0]["name"], "Officer Reyes");
}

#[tokio::test]
async fn test_forwards_path_and_query() {
    let upstream = spawn_upstream().await;
    let clock = ManualClock::new(START);
    let app = gateway(&upstream, Quota::default(), &clock);

    let response = app
        .oneshot(get_request("/api/personnel/42?include=status"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], "42");
    assert_eq!(body["query"], "include=status");
}

#[tokio::test]
async fn test_forwards_body_and_session_cookie() {
    let upstream = spawn_upstream().await;
    let clock = ManualClock::new(START);
    let app = gateway(&upstream, Quota::default(), &clock);

    let request = Request::builder()
        .method("POST")
        .uri("/api/assignments")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, "session=abc123")
        .body(Body::from(r#"{"personnel_id":"1","beat_id":"7"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        header_str(response.headers(), "set-cookie"),
        "session=renewed; Path=/"
    );
    assert!(header_str(response.headers(), "content-type").starts_with("application/json"));
    let body = json_body(response).await;
    assert_eq!(body["cookie"], "session=abc123");
    assert_eq!(body["created"]["beat_id"], "7");
}

#[tokio::test]
async fn test_rejects_request_over_quota() {
    let upstream = spawn_upstream().await;
    let clock = ManualClock::new(START);
    let app = gateway(&upstream, Quota::new(3, 60_000).unwrap(), &clock);

    let mut resets = Vec::new();
    for expected in ["2", "1", "0"] {
        let response = app
            .clone()
            .oneshot(get_request("/api/personnel"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(response.headers(), "x-ratelimit-remaining"), expected);
        resets.push(header_str(response.headers(), "x-ratelimit-reset"));
    }

    let response = app.oneshot(get_request("/api/personnel")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(response.headers(), "retry-after"), "60");
    assert_eq!(header_str(response.headers(), "x-ratelimit-remaining"), "0");
    resets.push(header_str(response.headers(), "x-ratelimit-reset"));
    assert!(resets.windows(2).all(|w| w[0] == w[1]));

    let body = json_body(response).await;
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(body["limit"], 3);
    assert_eq!(body["remaining"], 0);
    assert_eq!(body["retry_after"], 60);
}

#[tokio::test]
async fn test_quota_returns_after_window_expires() {
    let upstream = spawn_upstream().await;
    let clock = ManualClock::new(START);
    let app = gateway(&upstream, Quota::new(1, 1000).unwrap(), &clock);

    let first = app.clone().oneshot(get_request("/api/personnel")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let blocked = app.clone().oneshot(get_request("/api/personnel")).await.unwrap();
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);

    clock.advance(Duration::from_millis(1001));
    let again = app.oneshot(get_request("/api/personnel")).await.unwrap();
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(header_str(again.headers(), "x-ratelimit-remaining"), "0");
}

#[tokio::test]
async fn test_api_keys_have_separate_quotas() {
    let upstream = spawn_upstream().await;
    let clock = ManualClock::new(START);
    let app = gateway(&upstream, Quota::new(1, 60_000).unwrap(), &clock);

    let with_key = |key: &str| {
        Request::builder()
            .uri("/api/personnel")
            .header("x-api-key", key)
            .body(Body::empty())
            .unwrap()
    };

    let a1 = app.clone().oneshot(with_key("dispatch-a")).await.unwrap();
    let a2 = app.clone().oneshot(with_key("dispatch-a")).await.unwrap();
    let b1 = app.clone().oneshot(with_key("dispatch-b")).await.unwrap();
    let anon = app.oneshot(get_request("/api/personnel")).await.unwrap();

    assert_eq!(a1.status(), StatusCode::OK);
    assert_eq!(a2.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(b1.status(), StatusCode::OK);
    assert_eq!(anon.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_ignored_without_trust_proxy() {
    let upstream = spawn_upstream().await;
    let clock = ManualClock::new(START);
    let app = gateway(&upstream, Quota::new(1, 60_000).unwrap(), &clock);

    let spoofed = |ip: &str| {
        Request::builder()
            .uri("/api/personnel")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(spoofed("203.0.113.1")).await.unwrap();
    let second = app.oneshot(spoofed("203.0.113.2")).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_health_is_never_limited() {
    let clock = ManualClock::new(START);
    let app = gateway("127.0.0.1:1", Quota::new(1, 60_000).unwrap(), &clock);

    for _ in 0..5 {
        let response = app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-remaining").is_none());
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tracked_windows"], 0);
    }
}

#[tokio::test]
async fn test_unknown_resource_is_not_forwarded() {
    let clock = ManualClock::new(START);
    let app = gateway("127.0.0.1:1", Quota::default(), &clock);

    let response = app
        .clone()
        .oneshot(get_request("/api/payroll"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");

    // The backend was never contacted, so it is still considered healthy.
    let health = json_body(app.oneshot(get_request("/health")).await.unwrap()).await;
    assert_eq!(health["healthy_backends"], 1);
}

#[tokio::test]
async fn test_unreachable_backend_then_no_backend() {
    let clock = ManualClock::new(START);
    let app = gateway("127.0.0.1:1", Quota::default(), &clock);

    let failed = app
        .clone()
        .oneshot(get_request("/api/beats"))
        .await
        .unwrap();
    assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(header_str(failed.headers(), "x-ratelimit-remaining"), "9");

    let unavailable = app.oneshot(get_request("/api/beats")).await.unwrap();
    assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(unavailable).await["error"], "service_unavailable");
}

#[tokio::test]
async fn test_metrics_exposed() {
    let upstream = spawn_upstream().await;
    let clock = ManualClock::new(START);
    let app = gateway(&upstream, Quota::default(), &clock);

    app.clone()
        .oneshot(get_request("/api/personnel"))
        .await
        .unwrap();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("roster_api_requests_total"));
    assert!(text.contains("roster_rate_limit_windows"));
}

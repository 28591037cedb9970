use axum::{Json, extract::State};
use std::sync::Arc;
use crate::models::HealthResponse;
use crate::state::AppState;

// Never rate limited, so probes keep working while callers are throttled
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let healthy_backends = state.load_balancer.healthy_count();

    Json(HealthResponse {
        status: if healthy_backends > 0 { "healthy" } else { "degraded" },
        timestamp: chrono::Utc::now().to_rfc3339(),
        healthy_backends,
        tracked_windows: state.rate_limiter.tracked(),
    })
}
